//! Capsule store commands: prune and stats.

use anstream::println;
use anyhow::Result;
use chrono::{Duration, Utc};

use capkit::identity::project_hash;
use capkit::stats;
use capkit::store::CapsuleStore;
use capkit::styling::format_success;

use super::project_root;

const DEFAULT_RETENTION_DAYS: i64 = 30;

pub fn prune(days: Option<i64>, dry_run: bool) -> Result<i32> {
    let days = days.unwrap_or(DEFAULT_RETENTION_DAYS);
    let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
    let store = CapsuleStore::open_default()?;

    if dry_run {
        let count = store.count_older_than(&cutoff)?;
        println!("{count} records older than {days} days (dry run; nothing deleted)");
        return Ok(0);
    }

    let deleted = store.prune(&cutoff)?;
    println!(
        "{}",
        format_success(&format!("pruned {deleted} records older than {days} days"))
    );
    Ok(0)
}

pub fn search(term: &str, limit: usize) -> Result<i32> {
    let store = CapsuleStore::open_default()?;
    let hits = store.search(term, limit)?;
    if hits.is_empty() {
        println!("no records match '{term}'");
        return Ok(0);
    }
    for record in hits {
        println!("{}  [{}] {}", record.namespace, record.record_type, record.title);
        if !record.summary.is_empty() {
            println!("    {}", record.summary.lines().next().unwrap_or_default());
        }
    }
    Ok(0)
}

pub fn resolve(namespace: &str) -> Result<i32> {
    let store = CapsuleStore::open_default()?;
    let resolved = store.resolve(namespace)?;
    if resolved.records.is_empty() {
        println!("nothing at '{namespace}'");
        return Ok(0);
    }
    for record in &resolved.records {
        println!("[{}] {}/{}", record.record_type, record.namespace, record.title);
        if !record.summary.is_empty() {
            println!("    {}", record.summary.lines().next().unwrap_or_default());
        }
    }
    if !resolved.children.is_empty() {
        println!("children:");
        for child in &resolved.children {
            println!("  [{}] {}/{}", child.record_type, child.namespace, child.title);
        }
    }
    Ok(0)
}

pub fn stats(view: &str, arg: Option<&str>) -> Result<i32> {
    let store = CapsuleStore::open_default()?;
    let hash = project_hash(&project_root());
    print!("{}", stats::render(&store, &hash, view, arg)?);
    Ok(0)
}
