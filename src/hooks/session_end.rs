//! Session-end hook: summarize the session and, in crew mode, mark the
//! teammate idle.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use super::HookEvent;
use crate::crew::state::{TeamState, TeammateStatus};
use crate::git::Repository;
use crate::identity::Scope;
use crate::paths;
use crate::store::{CapsuleStore, ContextRecord, RecordType};

pub(crate) fn handle(
    store: &CapsuleStore,
    scope: &Scope,
    cwd: &Path,
    event: &HookEvent,
) -> Result<Option<String>> {
    if event.session_id.is_empty() {
        return Ok(None);
    }
    let sid = &event.session_id;
    let files = store.list(&scope.session_files_ns(sid), 1000)?.len();
    let subagents = store.list(&scope.session_subagents_ns(sid), 1000)?.len();
    let branch = Repository::at(cwd).current_branch().ok().flatten();
    let ended_at = Utc::now().to_rfc3339();

    let teammate_suffix = scope
        .teammate_name()
        .map(|t| format!(", teammate {t}"))
        .unwrap_or_default();
    let summary = format!(
        "Session {sid}: {files} files, {subagents} subagents{teammate_suffix} — {ended_at}"
    );

    let mut tags = vec!["session".to_string(), sid.clone()];
    if let Some(branch) = &branch {
        tags.push(format!("branch:{branch}"));
    }
    if let Some(teammate) = scope.teammate_name() {
        tags.push(teammate.to_string());
    }

    let record = ContextRecord::new(&scope.session_root_ns(), sid, RecordType::Meta)
        .with_summary(summary)
        .with_content(serde_json::json!({
            "files": files,
            "subagents": subagents,
            "branch": branch,
            "teammate": scope.teammate_name(),
            "ended_at": ended_at,
        }))
        .with_tags(tags);
    store.save(&record)?;

    // Best-effort team-state touch; a missing or corrupt state file must
    // not fail the hook
    if let Some(crew) = &scope.crew
        && let Err(e) = touch_team_state(scope, crew)
    {
        log::debug!("session-end team-state update: {e:#}");
    }

    Ok(None)
}

fn touch_team_state(scope: &Scope, crew: &crate::identity::CrewIdentity) -> Result<()> {
    let crew_dir = paths::project_crew_dir(&scope.project_hash);
    let Some(mut state) = TeamState::load(&crew_dir, &crew.profile_name)? else {
        return Ok(());
    };
    if let Some(teammate) = state.teammates.get_mut(&crew.teammate_name) {
        teammate.last_active = Some(Utc::now().to_rfc3339());
        teammate.status = TeammateStatus::Idle;
        state.save(&crew_dir)?;
    }
    Ok(())
}
