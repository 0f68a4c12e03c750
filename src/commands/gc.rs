//! Worktree GC command.

use std::io::{self, IsTerminal, Write};

use anstream::{eprintln, println};
use anyhow::Result;
use chrono::Utc;

use capkit::crew::config::DEFAULT_STALE_HOURS;
use capkit::crew::gc::{self, GcOptions};
use capkit::paths::{crew_root, format_path_for_display};
use capkit::styling::{format_success, format_warning};

pub fn run(delete_branches: bool, force: bool, dry_run: bool) -> Result<i32> {
    let crew_root = crew_root();
    let orphans = gc::find_orphans(&crew_root, DEFAULT_STALE_HOURS, Utc::now())?;

    if orphans.is_empty() {
        println!("no orphaned worktrees");
        return Ok(0);
    }

    for orphan in &orphans {
        let size = orphan
            .disk_bytes
            .map(format_size)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{}  ({}, {}, {size})",
            format_path_for_display(&orphan.entry.path),
            orphan.entry.branch,
            orphan.reason,
        );
    }

    if dry_run {
        println!("dry run; nothing removed");
        return Ok(0);
    }
    if !force && !confirm(orphans.len())? {
        println!("aborted");
        return Ok(0);
    }

    let report = gc::collect(
        &crew_root,
        &orphans,
        GcOptions {
            delete_branches,
            dry_run: false,
        },
    )?;
    for path in &report.removed {
        println!("{}", format_success(&format!("removed {}", format_path_for_display(path))));
    }
    for (path, error) in &report.failed {
        eprintln!(
            "{}",
            format_warning(&format!("{}: {error}", format_path_for_display(path)))
        );
    }
    Ok(0)
}

/// Ask before removing; non-interactive invocations proceed (scripted gc).
fn confirm(count: usize) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(true);
    }
    eprint!("Remove {count} orphaned worktree(s)? [y/N] ");
    io::stderr().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let response = input.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

fn format_size(bytes: u64) -> String {
    match bytes {
        0..=1023 => format!("{bytes} B"),
        1024..=1048575 => format!("{:.1} KB", bytes as f64 / 1024.0),
        1048576..=1073741823 => format!("{:.1} MB", bytes as f64 / 1048576.0),
        _ => format!("{:.1} GB", bytes as f64 / 1073741824.0),
    }
}
