//! Pre-compaction handoff documents.
//!
//! Generated while the session's full context is still available and saved
//! as a SUMMARY record; the next session-start injects it verbatim. The
//! generator never fails upward: any internal error degrades to a one-line
//! summary.

use chrono::DateTime;

use crate::identity::Scope;
use crate::store::{CapsuleStore, ContextRecord};

/// Build the handoff markdown for a session.
pub fn generate(store: &CapsuleStore, scope: &Scope, session_id: &str) -> String {
    build(store, scope, session_id)
        .unwrap_or_else(|_| format!("Session {session_id} handoff: details unavailable"))
}

fn build(store: &CapsuleStore, scope: &Scope, session_id: &str) -> anyhow::Result<String> {
    let files = store.list(&scope.session_files_ns(session_id), 500)?;
    let subagents = store.list(&scope.session_subagents_ns(session_id), 100)?;

    let mut created = Vec::new();
    let mut modified = Vec::new();
    let mut reviewed = Vec::new();
    for record in &files {
        let path = record
            .content
            .get("filePath")
            .and_then(|v| v.as_str())
            .unwrap_or(&record.title)
            .to_string();
        match record.content.get("action").and_then(|v| v.as_str()) {
            Some("write") => created.push(path),
            Some("edit") => modified.push(path),
            Some("read") => reviewed.push(path),
            _ => modified.push(path),
        }
    }

    let mut doc = String::from("# Session Handoff\n");
    push_group(&mut doc, "Created", &created);
    push_group(&mut doc, "Modified", &modified);
    // Reviewed files are only interesting in small numbers; a long read
    // trail is noise in a continuity document
    if !reviewed.is_empty() && reviewed.len() <= 5 {
        push_group(&mut doc, "Reviewed", &reviewed);
    }

    if !subagents.is_empty() {
        doc.push_str("\n## Sub-Agents Used\n");
        for record in &subagents {
            doc.push_str(&format!("- {}\n", truncate(&record.summary, 180)));
        }
    }

    doc.push_str("\n## Session Summary\n");
    let mut summary = format!(
        "{} file{} touched, {} sub-agent{}",
        files.len(),
        plural(files.len()),
        subagents.len(),
        plural(subagents.len()),
    );
    if let Some(duration) = wall_clock(&files, &subagents) {
        summary.push_str(&format!(", {}", duration));
    }
    doc.push_str(&summary);
    doc.push('\n');
    Ok(doc)
}

fn push_group(doc: &mut String, heading: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    doc.push_str(&format!("\n## {heading}\n"));
    for path in paths {
        doc.push_str(&format!("- {path}\n"));
    }
}

/// Wall-clock duration from the min/max record timestamps, when at least
/// two distinct timestamps exist.
fn wall_clock(files: &[ContextRecord], subagents: &[ContextRecord]) -> Option<String> {
    let timestamps: Vec<i64> = files
        .iter()
        .chain(subagents.iter())
        .filter_map(|r| {
            let raw = r
                .content
                .get("timestamp")
                .and_then(|v| v.as_str())
                .unwrap_or(&r.created_at);
            DateTime::parse_from_rfc3339(raw).ok()
        })
        .map(|dt| dt.timestamp())
        .collect();

    let min = *timestamps.iter().min()?;
    let max = *timestamps.iter().max()?;
    let seconds = max - min;
    if seconds <= 0 {
        return None;
    }
    let minutes = seconds / 60;
    Some(if minutes >= 60 {
        format!("~{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("~{}m", minutes.max(1))
    })
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
