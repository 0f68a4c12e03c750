//! Read-only aggregation views over the capsule store (`cap stats`).

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::store::CapsuleStore;

pub const VIEWS: &[&str] = &[
    "summary",
    "types",
    "namespaces",
    "files",
    "agents",
    "sessions",
    "branches",
];

/// Render a stats view for a project as plain text.
pub fn render(
    store: &CapsuleStore,
    project_hash: &str,
    view: &str,
    arg: Option<&str>,
) -> Result<String> {
    let base = format!("proj/{project_hash}");
    match view {
        "summary" => summary(store, &base),
        "types" => types(store),
        "namespaces" => namespaces(store, arg.map(str::to_string).or(Some(base)).as_deref()),
        "files" => top_by_tag(store, &base, "file", "Most touched files"),
        "agents" => top_by_tag(store, &base, "subagent", "Most used sub-agents"),
        "sessions" => sessions(store, &base),
        "branches" => branches(store, &base, arg),
        _ => bail!("unknown stats view '{view}' (available: {})", VIEWS.join(", ")),
    }
}

fn summary(store: &CapsuleStore, base: &str) -> Result<String> {
    let mut out = format!("{} records total\n", store.count_all()?);
    for (record_type, count) in store.count_by_type()? {
        out.push_str(&format!("  {record_type:<12} {count}\n"));
    }
    let project_count: i64 = store
        .count_by_namespace(Some(base))?
        .iter()
        .map(|(_, n)| n)
        .sum();
    out.push_str(&format!("{project_count} records in this project\n"));
    Ok(out)
}

fn types(store: &CapsuleStore) -> Result<String> {
    let mut out = String::new();
    for (record_type, count) in store.count_by_type()? {
        out.push_str(&format!("{record_type:<12} {count}\n"));
    }
    Ok(out)
}

fn namespaces(store: &CapsuleStore, prefix: Option<&str>) -> Result<String> {
    let mut out = String::new();
    for (namespace, count) in store.count_by_namespace(prefix)? {
        out.push_str(&format!("{count:>6}  {namespace}\n"));
    }
    Ok(out)
}

/// Top-K titles among records carrying a tag, counted by saved operations
/// plus accumulated hits.
fn top_by_tag(store: &CapsuleStore, base: &str, tag: &str, heading: &str) -> Result<String> {
    let records = store.recent_with_tag(base, tag, 1000)?;
    let mut counts: HashMap<String, i64> = HashMap::new();
    for record in &records {
        *counts.entry(record.title.clone()).or_default() += 1 + record.hit_count;
    }
    let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(10);

    let mut out = format!("{heading}:\n");
    for (title, count) in ranked {
        out.push_str(&format!("{count:>6}  {title}\n"));
    }
    Ok(out)
}

fn sessions(store: &CapsuleStore, base: &str) -> Result<String> {
    let mut records = store.list(&format!("{base}/session"), 25)?;
    // Crew-scoped sessions live under crew/<teammate>/session
    for record in store.list_subtree(&format!("{base}/crew"), 200)? {
        if record.namespace.ends_with("/session") {
            records.push(record);
        }
    }
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    records.truncate(25);

    let mut out = String::new();
    for record in records {
        out.push_str(&format!("{}\n", record.summary));
    }
    if out.is_empty() {
        out.push_str("no sessions recorded\n");
    }
    Ok(out)
}

fn branches(store: &CapsuleStore, base: &str, arg: Option<&str>) -> Result<String> {
    let prefix = match arg {
        Some(branch) => format!("branch:{branch}"),
        None => "branch:".to_string(),
    };
    let records = store.list_by_tag_prefix(base, &prefix, 50)?;
    let mut out = String::new();
    for record in records {
        let branch = record
            .tags
            .iter()
            .find(|t| t.starts_with("branch:"))
            .map(|t| &t["branch:".len()..])
            .unwrap_or("-");
        out.push_str(&format!("{branch:<24} {}\n", record.summary));
    }
    if out.is_empty() {
        out.push_str("no branch-tagged records\n");
    }
    Ok(out)
}
