//! Session-start hook: assemble the additional context injected into a new
//! session.
//!
//! Sections, in order: pruning notice, the most recent handoff (or a
//! branch-matched prior session), top discoveries, recently touched files,
//! team activity, and the crew status table. All of it is best-effort; an
//! empty context produces no output at all.

use std::path::Path;

use anyhow::Result;
use chrono::{Duration, Utc};

use super::{HookEvent, post_tool_use};
use crate::crew::config::CrewConfig;
use crate::crew::state::TeamState;
use crate::git::Repository;
use crate::identity::Scope;
use crate::paths;
use crate::store::{CapsuleStore, ContextRecord, RecordType};

/// Records older than this many days are pruned at session start.
const RETENTION_DAYS: i64 = 30;

pub(crate) fn handle(
    store: &CapsuleStore,
    scope: &Scope,
    cwd: &Path,
    _event: &HookEvent,
) -> Result<Option<String>> {
    let mut sections: Vec<String> = Vec::new();

    if let Some(notice) = prune_old_records(store, scope) {
        sections.push(notice);
    }

    match store.latest_with_tag(&scope.session_root_ns(), "handoff")? {
        Some(handoff) => {
            sections.push(format!("## Session Handoff\n\n{}", handoff.summary));
        }
        None => {
            if let Some(section) = prior_session_section(store, scope, cwd)? {
                sections.push(section);
            }
        }
    }

    let discoveries = post_tool_use::top_discoveries(store, scope, 5)?;
    if !discoveries.is_empty() {
        let mut section = String::from("## Top Discoveries\n");
        for record in &discoveries {
            section.push_str(&format!("- {}\n", truncate(&record.summary, 140)));
        }
        sections.push(section.trim_end().to_string());
    }

    let files = store.recent_with_tag(&scope.session_root_ns(), "file", 3)?;
    if !files.is_empty() {
        let mut section = String::from("## Recent Files\n");
        for record in &files {
            section.push_str(&format!("- {}\n", record.summary));
        }
        sections.push(section.trim_end().to_string());
    }

    if let Some(section) = team_activity_section(store, scope)? {
        sections.push(section);
    }

    if let Some(section) = crew_status_section(scope, cwd) {
        sections.push(section);
    }

    // Zero prior records: exit cleanly with no output at all
    if sections.is_empty() {
        return Ok(None);
    }
    Ok(Some(super::session_start_output(&sections.join("\n\n"))))
}

/// Prune old records at most once per day, keyed by a marker record.
fn prune_old_records(store: &CapsuleStore, scope: &Scope) -> Option<String> {
    let meta_ns = format!("proj/{}/meta", scope.project_hash);
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let already = store
        .get(&meta_ns, "last-prune")
        .ok()
        .flatten()
        .and_then(|r| r.content.get("date").and_then(|d| d.as_str().map(String::from)))
        .is_some_and(|date| date == today);
    if already {
        return None;
    }

    let cutoff = (Utc::now() - Duration::days(RETENTION_DAYS)).to_rfc3339();
    let deleted = store.prune(&cutoff).ok()?;
    let marker = ContextRecord::new(&meta_ns, "last-prune", RecordType::Meta)
        .with_summary(format!("pruned {deleted} records"))
        .with_content(serde_json::json!({ "date": today, "deleted": deleted }));
    store.save(&marker).ok()?;

    (deleted > 0).then(|| {
        format!("Pruned {deleted} context records older than {RETENTION_DAYS} days.")
    })
}

/// Best-effort prior session: prefer the most recent session summary on
/// the current branch; fail closed to the most recent session overall.
fn prior_session_section(
    store: &CapsuleStore,
    scope: &Scope,
    cwd: &Path,
) -> Result<Option<String>> {
    let sessions = store.list(&scope.session_root_ns(), 25)?;
    if sessions.is_empty() {
        return Ok(None);
    }
    let current_branch = Repository::at(cwd).current_branch().ok().flatten();

    if let Some(branch) = &current_branch
        && let Some(matched) = sessions.iter().find(|r| {
            r.content.get("branch").and_then(|b| b.as_str()) == Some(branch.as_str())
        })
    {
        return Ok(Some(format!(
            "## Branch Context ({branch})\n\n{}",
            matched.summary
        )));
    }

    Ok(Some(format!("## Last Session\n\n{}", sessions[0].summary)))
}

/// Recent session summaries from other teammates, crew mode only.
fn team_activity_section(store: &CapsuleStore, scope: &Scope) -> Result<Option<String>> {
    let Some(crew) = &scope.crew else {
        return Ok(None);
    };
    let crew_ns = format!("proj/{}/crew", scope.project_hash);
    let records = store.list_subtree(&crew_ns, 200)?;

    let mut lines = Vec::new();
    for record in records {
        // Session summaries live at proj/<hash>/crew/<name>/session
        let segments: Vec<&str> = record.namespace.split('/').collect();
        if segments.len() < 2 || segments[segments.len() - 1] != "session" {
            continue;
        }
        let name = segments[segments.len() - 2];
        if name == crew.teammate_name || name == "_shared" {
            continue;
        }
        lines.push(format!("- {}: {}", name, truncate(&record.summary, 140)));
        if lines.len() == 3 {
            break;
        }
    }
    if lines.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("## Team Activity\n{}", lines.join("\n"))))
}

/// Compact per-profile teammate status table, with stale markers.
fn crew_status_section(scope: &Scope, cwd: &Path) -> Option<String> {
    let config = CrewConfig::load(cwd).ok().flatten()?;
    let crew_dir = paths::project_crew_dir(&scope.project_hash);
    let now = Utc::now();

    let mut out = String::new();
    for (profile_name, _) in config.profile_map() {
        let Ok(Some(state)) = TeamState::load(&crew_dir, &profile_name) else {
            continue;
        };
        let stale_hours = config.stale_hours_for(&profile_name);
        out.push_str(&format!("## Crew Status ({profile_name})\n"));
        for (name, teammate) in &state.teammates {
            let age = match teammate.hours_since_active(now) {
                Some(hours) => format!("{hours:.1}h ago"),
                None => "never".to_string(),
            };
            let stale = if teammate.is_stale(stale_hours, now) {
                "  [stale]"
            } else {
                ""
            };
            let path = teammate
                .worktree_path
                .as_deref()
                .map(paths::short_path)
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "- {name}: {:?} | {age} | {} | {path}{stale}\n",
                teammate.status, teammate.branch
            ));
        }
        out.push('\n');
    }
    let trimmed = out.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn truncate(text: &str, max: usize) -> String {
    post_tool_use::truncate(text, max)
}
