//! Merge pilot: preview, overlap detection, and serialized execution.
//!
//! Preview never touches the working tree (`merge-tree` probing only).
//! Execution is the one path that does, and it always tags a backup on the
//! main branch first. Conflict resolution stays with the user: a failed
//! merge is aborted and reported, never left half-done.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::git::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BranchStatus {
    Clean,
    Conflict,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchPreview {
    pub teammate: String,
    pub branch: String,
    pub status: BranchStatus,
    pub changed_files: Vec<String>,
    pub conflict_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Files modified by more than one teammate; contention to resolve before
/// merging.
#[derive(Debug, Clone, Serialize)]
pub struct Overlap {
    pub teammates: (String, String),
    pub files: Vec<String>,
}

/// Preview each teammate branch against the main branch.
pub fn preview(
    project_root: &Path,
    main_branch: &str,
    branches: &[(String, String)],
) -> Vec<BranchPreview> {
    let repo = Repository::at(project_root);
    branches
        .iter()
        .filter(|(_, branch)| branch != main_branch)
        .map(|(teammate, branch)| preview_branch(&repo, main_branch, teammate, branch))
        .collect()
}

fn preview_branch(
    repo: &Repository,
    main_branch: &str,
    teammate: &str,
    branch: &str,
) -> BranchPreview {
    if !repo.branch_exists_local(branch) {
        return BranchPreview {
            teammate: teammate.to_string(),
            branch: branch.to_string(),
            status: BranchStatus::Error,
            changed_files: Vec::new(),
            conflict_files: Vec::new(),
            message: Some(format!("branch '{branch}' does not exist")),
        };
    }

    let changed_files = match repo.changed_files(main_branch, branch) {
        Ok(files) => files,
        Err(e) => {
            return BranchPreview {
                teammate: teammate.to_string(),
                branch: branch.to_string(),
                status: BranchStatus::Error,
                changed_files: Vec::new(),
                conflict_files: Vec::new(),
                message: Some(e.to_string()),
            };
        }
    };

    match repo.merge_probe(main_branch, branch) {
        Ok(probe) if probe.conflicts => {
            // Inconclusive conflict-file parsing falls back to the full
            // changed set: over-reporting beats hiding a conflict
            let conflict_files = if probe.conflict_files.is_empty() {
                changed_files.clone()
            } else {
                probe.conflict_files
            };
            BranchPreview {
                teammate: teammate.to_string(),
                branch: branch.to_string(),
                status: BranchStatus::Conflict,
                changed_files,
                conflict_files,
                message: None,
            }
        }
        Ok(_) => BranchPreview {
            teammate: teammate.to_string(),
            branch: branch.to_string(),
            status: BranchStatus::Clean,
            changed_files,
            conflict_files: Vec::new(),
            message: None,
        },
        Err(e) => BranchPreview {
            teammate: teammate.to_string(),
            branch: branch.to_string(),
            status: BranchStatus::Error,
            changed_files,
            conflict_files: Vec::new(),
            message: Some(e.to_string()),
        },
    }
}

/// Pairwise changed-file intersections across teammates.
pub fn detect_overlaps(previews: &[BranchPreview]) -> Vec<Overlap> {
    let mut overlaps = Vec::new();
    for (i, a) in previews.iter().enumerate() {
        for b in &previews[i + 1..] {
            let files: Vec<String> = a
                .changed_files
                .iter()
                .filter(|f| b.changed_files.contains(f))
                .cloned()
                .collect();
            if !files.is_empty() {
                overlaps.push(Overlap {
                    teammates: (a.teammate.clone(), b.teammate.clone()),
                    files,
                });
            }
        }
    }
    overlaps
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub create_backup: bool,
    pub test_command: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            test_command: None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct MergeReport {
    pub success: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_tag: Option<String>,
}

/// Execute merges serially through the main-branch checkout: clean
/// branches first, then conflicting ones; error branches are skipped with
/// their recorded reason.
pub fn execute(
    project_root: &Path,
    main_branch: &str,
    previews: &[BranchPreview],
    options: &MergeOptions,
) -> Result<MergeReport> {
    let repo = Repository::at(project_root);
    let mut report = MergeReport::default();

    repo.checkout(main_branch)?;

    if options.create_backup {
        let tag = format!("crew-backup-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        repo.create_tag(&tag)?;
        report.backup_tag = Some(tag);
    }

    let mut ordered: Vec<&BranchPreview> = Vec::new();
    ordered.extend(previews.iter().filter(|p| p.status == BranchStatus::Clean));
    ordered.extend(previews.iter().filter(|p| p.status == BranchStatus::Conflict));
    for preview in previews.iter().filter(|p| p.status == BranchStatus::Error) {
        report.skipped.push((
            preview.branch.clone(),
            preview
                .message
                .clone()
                .unwrap_or_else(|| "preview error".to_string()),
        ));
    }

    for preview in ordered {
        let branch = &preview.branch;
        repo.checkout(main_branch)?;
        let prior = repo.rev_parse("HEAD")?;

        if let Err(e) = repo.merge_no_edit(branch) {
            let _ = repo.merge_abort();
            report.failed.push((branch.clone(), e.to_string()));
            continue;
        }

        if let Some(test_command) = &options.test_command {
            if run_test_command(project_root, test_command) {
                report.success.push(branch.clone());
            } else {
                repo.reset_hard(&prior)?;
                report
                    .failed
                    .push((branch.clone(), format!("tests failed: {test_command}")));
            }
        } else {
            report.success.push(branch.clone());
        }
    }

    Ok(report)
}

/// Run the user-supplied test command in the project root through the
/// platform shell.
fn run_test_command(project_root: &Path, command: &str) -> bool {
    use std::process::Command;

    #[cfg(target_os = "windows")]
    let (shell, shell_arg) = ("cmd", "/C");
    #[cfg(not(target_os = "windows"))]
    let (shell, shell_arg) = ("sh", "-c");

    Command::new(shell)
        .arg(shell_arg)
        .arg(command)
        .current_dir(project_root)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
