//! Post-tool-use capture: the primary persistence path.
//!
//! File reads/writes/edits become META records under the session's `files`
//! namespace; sub-agent spawns become SUMMARY records under `subagents`.
//! Reads additionally surface related discoveries back to the host, and in
//! crew mode specialist sub-agent results are mined for shareable
//! discoveries.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use super::HookEvent;
use crate::identity::Scope;
use crate::store::{CapsuleStore, ContextRecord, QueryOrder, RecordType};

/// Path segments that mark VCS metadata or dependency caches; operations
/// under these are noise, not context.
const SKIP_SEGMENTS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "vendor",
    ".venv",
    "__pycache__",
    "dist",
    "build",
];

const FILE_TOOLS: &[&str] = &["Read", "Write", "Edit"];

/// Phrases that mark a specialist sub-agent result as a discovery.
const DISCOVERY_MARKERS: &[&str] = &[
    "found",
    "discovered",
    "identified",
    "pattern:",
    "issue:",
    "important:",
    "key finding:",
];

pub(crate) fn handle(
    store: &CapsuleStore,
    scope: &Scope,
    event: &HookEvent,
) -> Result<Option<String>> {
    let Some(tool_name) = event.tool_name.as_deref() else {
        return Ok(None);
    };

    if FILE_TOOLS.contains(&tool_name)
        && let Some(file_path) = event.file_path()
    {
        if !is_captured_path(Path::new(file_path)) {
            return Ok(None);
        }
        persist_file_operation(store, scope, event, tool_name, file_path)?;
        if tool_name == "Read" {
            // Surfacing is best-effort; a failed query must not block the
            // host's read
            return Ok(surface_discoveries(store, scope, file_path).unwrap_or(None));
        }
        return Ok(None);
    }

    if tool_name == "Task"
        && let Some(agent_type) = event.tool_input.subagent_type.as_deref()
    {
        persist_subagent(store, scope, event, agent_type)?;
        if scope.crew.is_some() && agent_type != "general-purpose" {
            capture_discovery(store, scope, event, agent_type)?;
        }
    }

    Ok(None)
}

/// Whether a file path is worth capturing (not VCS metadata, not a
/// dependency cache).
fn is_captured_path(path: &Path) -> bool {
    !path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| SKIP_SEGMENTS.contains(&s))
    })
}

fn persist_file_operation(
    store: &CapsuleStore,
    scope: &Scope,
    event: &HookEvent,
    tool_name: &str,
    file_path: &str,
) -> Result<()> {
    let action = tool_name.to_lowercase();
    let title = Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.to_string());
    let mut tags = vec!["file".to_string(), action.clone(), event.session_id.clone()];
    if let Some(teammate) = scope.teammate_name() {
        tags.push(teammate.to_string());
    }
    let record = ContextRecord::new(
        &scope.session_files_ns(&event.session_id),
        &title,
        RecordType::Meta,
    )
    .with_summary(format!("{}: {}", action, file_path))
    .with_content(serde_json::json!({
        "filePath": file_path,
        "action": action,
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .with_tags(tags);
    store.save(&record)
}

fn persist_subagent(
    store: &CapsuleStore,
    scope: &Scope,
    event: &HookEvent,
    agent_type: &str,
) -> Result<()> {
    let prompt = event.tool_input.prompt.as_deref().unwrap_or_default();
    let mut tags = vec![
        "subagent".to_string(),
        agent_type.to_string(),
        event.session_id.clone(),
    ];
    if let Some(teammate) = scope.teammate_name() {
        tags.push(teammate.to_string());
    }
    let record = ContextRecord::new(
        &scope.session_subagents_ns(&event.session_id),
        &format!("{} - {}", agent_type, Utc::now().to_rfc3339()),
        RecordType::Summary,
    )
    .with_summary(format!("{}: {}", agent_type, truncate(prompt, 200)))
    .with_content(serde_json::json!({
        "subagent_type": agent_type,
        "prompt": prompt,
    }))
    .with_tags(tags);
    store.save(&record)
}

/// Query the discovery namespaces for records mentioning the file and emit
/// them as a markdown fragment for the host to surface.
fn surface_discoveries(
    store: &CapsuleStore,
    scope: &Scope,
    file_path: &str,
) -> Result<Option<String>> {
    let basename = Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut namespaces = vec![scope.discoveries_ns()];
    if scope.crew.is_some() {
        namespaces.push(scope.shared_discoveries_ns());
    }

    let mut hits: Vec<ContextRecord> = Vec::new();
    for ns in &namespaces {
        for term in [file_path, basename.as_str()] {
            if term.is_empty() {
                continue;
            }
            for record in store.mentions(ns, term, 5)? {
                if !hits
                    .iter()
                    .any(|h| h.namespace == record.namespace && h.title == record.title)
                {
                    hits.push(record);
                }
            }
        }
    }
    if hits.is_empty() {
        return Ok(None);
    }
    hits.truncate(3);

    let mut out = String::from("### Related Discoveries\n");
    for record in &hits {
        store.bump_hit(&record.namespace, &record.title)?;
        out.push_str(&format!("- {}\n", truncate(&record.summary, 160)));
    }
    Ok(Some(out))
}

/// Mine a specialist sub-agent result for a single shareable discovery.
fn capture_discovery(
    store: &CapsuleStore,
    scope: &Scope,
    event: &HookEvent,
    agent_type: &str,
) -> Result<()> {
    let Some(text) = event.tool_result_text() else {
        return Ok(());
    };
    let Some(span) = extract_discovery_span(&text) else {
        return Ok(());
    };

    let mut tags = vec!["discovery".to_string(), "crew-shared".to_string(), agent_type.to_string()];
    if let Some(teammate) = scope.teammate_name() {
        tags.push(teammate.to_string());
    }
    let record = ContextRecord::new(
        &scope.shared_discoveries_ns(),
        &format!("{} - {}", agent_type, Utc::now().to_rfc3339()),
        RecordType::Summary,
    )
    .with_summary(span.clone())
    .with_content(serde_json::json!({
        "agent": agent_type,
        "excerpt": span,
    }))
    .with_tags(tags);
    store.save(&record)
}

/// Extract the first discovery span: from a marker phrase to the end of
/// its line, clamped to 10..=100 chars. One discovery per invocation.
fn extract_discovery_span(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let start = DISCOVERY_MARKERS
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min()?;
    // Lowercasing can shift byte offsets for some scripts; bail rather
    // than slice off-boundary
    if !text.is_char_boundary(start) {
        return None;
    }

    let rest = &text[start..];
    let line = rest.lines().next().unwrap_or(rest).trim();
    if line.len() < 10 {
        return None;
    }
    Some(truncate(line, 100))
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

/// Expose the top discoveries for the session-start hook.
pub(crate) fn top_discoveries(
    store: &CapsuleStore,
    scope: &Scope,
    limit: usize,
) -> Result<Vec<ContextRecord>> {
    let mut records = store.query(&scope.discoveries_ns(), QueryOrder::Hits, limit)?;
    if scope.crew.is_some() {
        records.extend(store.query(&scope.shared_discoveries_ns(), QueryOrder::Hits, limit)?);
    }
    records.sort_by(|a, b| b.hit_count.cmp(&a.hit_count).then(b.updated_at.cmp(&a.updated_at)));
    records.truncate(limit);
    Ok(records)
}
