//! Merge pilot commands: merge-preview and merge.

use anstream::println;
use anyhow::Result;

use capkit::crew::lifecycle;
use capkit::crew::merge::{self, BranchStatus, MergeOptions};
use capkit::styling::{BOLD, GREEN, WARNING, format_error, format_success, format_warning};

use super::{project_crew_dir, project_root};

pub fn preview(profile: Option<&str>) -> Result<i32> {
    let root = project_root();
    let crew_dir = project_crew_dir(&root);
    let (main_branch, branches) = lifecycle::merge_branches(&root, &crew_dir, profile)?;
    let previews = merge::preview(&root, &main_branch, &branches);

    if previews.is_empty() {
        println!("no teammate branches to merge into '{main_branch}'");
        return Ok(0);
    }

    println!("{BOLD}merge preview against '{main_branch}'{BOLD:#}");
    for preview in &previews {
        match preview.status {
            BranchStatus::Clean => println!(
                "  {GREEN}clean{GREEN:#}     {} ({} files)",
                preview.branch,
                preview.changed_files.len()
            ),
            BranchStatus::Conflict => {
                println!(
                    "  {WARNING}conflict{WARNING:#}  {} ({} files, {} conflicting)",
                    preview.branch,
                    preview.changed_files.len(),
                    preview.conflict_files.len()
                );
                for file in &preview.conflict_files {
                    println!("            - {file}");
                }
            }
            BranchStatus::Error => println!(
                "  error     {} ({})",
                preview.branch,
                preview.message.as_deref().unwrap_or("unknown")
            ),
        }
    }

    let overlaps = merge::detect_overlaps(&previews);
    if !overlaps.is_empty() {
        println!("\n{BOLD}overlapping changes{BOLD:#}");
        for overlap in overlaps {
            println!(
                "  {} and {}: {}",
                overlap.teammates.0,
                overlap.teammates.1,
                overlap.files.join(", ")
            );
        }
    }
    Ok(0)
}

pub fn execute(profile: Option<&str>, test: Option<String>, no_backup: bool) -> Result<i32> {
    let root = project_root();
    let crew_dir = project_crew_dir(&root);
    let (main_branch, branches) = lifecycle::merge_branches(&root, &crew_dir, profile)?;
    let previews = merge::preview(&root, &main_branch, &branches);

    let options = MergeOptions {
        create_backup: !no_backup,
        test_command: test,
    };
    let report = merge::execute(&root, &main_branch, &previews, &options)?;

    if let Some(tag) = &report.backup_tag {
        println!("backup tag: {tag}");
    }
    for branch in &report.success {
        println!("{}", format_success(&format!("merged {branch}")));
    }
    for (branch, reason) in &report.failed {
        println!("{}", format_error(&format!("{branch}: {reason}")));
    }
    for (branch, reason) in &report.skipped {
        println!("{}", format_warning(&format!("skipped {branch}: {reason}")));
    }
    Ok(0)
}
