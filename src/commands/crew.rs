//! Crew lifecycle commands: init, start, stop, status, doctor.

use anstream::{eprintln, println};
use anyhow::Result;
use chrono::Utc;

use capkit::crew::lifecycle;
use capkit::paths::format_path_for_display;
use capkit::styling::{BOLD, CYAN, HINT, format_error, format_success, format_warning};

use super::{project_crew_dir, project_root};

pub fn init() -> Result<i32> {
    let root = project_root();
    let outcome = lifecycle::init(&root)?;
    if !outcome.created {
        eprintln!(
            "{}",
            format_error(&format!(
                "config already present at {}",
                format_path_for_display(&outcome.path)
            ))
        );
        return Ok(1);
    }
    println!(
        "{}",
        format_success(&format!(
            "wrote {} — edit teammates, then run 'cap start'",
            format_path_for_display(&outcome.path)
        ))
    );
    Ok(0)
}

pub fn start(profile: Option<&str>, fresh: bool) -> Result<i32> {
    let root = project_root();
    let crew_dir = project_crew_dir(&root);
    let outcome = lifecycle::start(&root, &crew_dir, profile, fresh)?;

    for warning in &outcome.warnings {
        eprintln!("{}", format_warning(warning));
    }
    for (teammate, error) in &outcome.teammate_errors {
        eprintln!(
            "{}",
            format_error(&format!("teammate '{teammate}' not provisioned: {error}"))
        );
    }

    let mode = if outcome.resume { "resume" } else { "fresh" };
    eprintln!(
        "{}",
        format_success(&format!(
            "profile '{}' started ({mode}); lead prompt saved to {}",
            outcome.profile.profile_name,
            format_path_for_display(&outcome.lead_prompt_path)
        ))
    );

    // The lead prompt itself goes to stdout so it can be piped to the host
    println!("{}", outcome.lead_prompt);
    Ok(0)
}

pub fn stop(profile: Option<&str>, cleanup: bool) -> Result<i32> {
    let root = project_root();
    let crew_dir = project_crew_dir(&root);
    let outcome = lifecycle::stop(&root, &crew_dir, profile, cleanup)?;

    if !outcome.stopped {
        println!("no team state found; nothing to stop");
        return Ok(0);
    }
    for path in &outcome.removed_worktrees {
        println!("removed {}", format_path_for_display(path));
    }
    for error in &outcome.errors {
        eprintln!("{}", format_warning(error));
    }
    println!("{}", format_success("team stopped"));
    Ok(0)
}

pub fn status(profile: Option<&str>) -> Result<i32> {
    let root = project_root();
    let crew_dir = project_crew_dir(&root);
    let states = lifecycle::status(&root, &crew_dir, profile)?;
    if states.is_empty() {
        println!("no team state; run 'cap start' first");
        return Ok(0);
    }

    let now = Utc::now();
    for state in states {
        println!(
            "{BOLD}{}{BOLD:#} (profile {CYAN}{}{CYAN:#}, {:?}, config {})",
            state.team_name,
            state.profile_name,
            state.status,
            state.config_hash,
        );
        for (name, teammate) in &state.teammates {
            let age = teammate
                .hours_since_active(now)
                .map(|h| format!("{h:.1}h ago"))
                .unwrap_or_else(|| "never".to_string());
            let path = teammate
                .worktree_path
                .as_deref()
                .map(capkit::paths::short_path)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {name:<14} {:<8} {age:<12} {:<24} {HINT}{path}{HINT:#}",
                format!("{:?}", teammate.status).to_lowercase(),
                teammate.branch,
            );
        }
        println!();
    }
    Ok(0)
}

pub fn doctor(profile: Option<&str>) -> Result<i32> {
    let root = project_root();
    let crew_dir = project_crew_dir(&root);
    let reports = lifecycle::doctor(&root, &crew_dir, profile)?;
    if reports.is_empty() {
        println!("no team state; nothing to diagnose");
        return Ok(0);
    }

    for (profile_name, rows) in reports {
        println!("{BOLD}profile {profile_name}{BOLD:#}");
        println!(
            "  {:<14} {:<13} {:<12} {:<8} recommendation",
            "teammate", "health", "last active", "commits"
        );
        for row in rows {
            let age = row
                .hours_since_active
                .map(|h| format!("{h:.1}h ago"))
                .unwrap_or_else(|| "never".to_string());
            let commits = row
                .recent_commits
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<14} {:<13} {age:<12} {commits:<8} {}",
                row.teammate, row.class, row.recommendation
            );
        }
        println!();
    }
    Ok(0)
}
