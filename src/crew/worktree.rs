//! Worktree provisioning and teardown.
//!
//! Each teammate gets a git worktree next to the project directory, plus a
//! hybrid `.capkit` state directory: shared tooling is symlinked from the
//! source project so agents/skills stay in sync, while session-local state
//! stays inside the worktree.
//!
//! Teardown MUST unlink those symlinks before any recursive delete:
//! removing a worktree must never traverse into the source project's
//! shared state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;

use super::config::ResolvedTeammate;
use crate::git::Repository;
use crate::identity::CrewIdentity;
use crate::paths::STATE_DIR_NAME;

/// State-directory entries shared with the source project via symlinks.
pub const SHARED_DIRS: &[&str] = &["agents", "skills", "commands", "hooks"];
pub const SHARED_FILES: &[&str] = &["settings.json"];

/// Local-only state subdirectories created inside each worktree.
const LOCAL_DIRS: &[&str] = &["sessions", "logs"];

/// Warn when a resumed branch is this far behind the main branch.
const BEHIND_WARN_THRESHOLD: usize = 100;

/// Sanitize a branch name for filesystem use: `/` becomes `--`, anything
/// else outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_branch(branch: &str) -> String {
    branch
        .replace('/', "--")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Deterministic worktree path for a teammate branch.
///
/// The default profile maps to `<project_root>-<branch>`; named profiles
/// insert the profile name: `<project_root>-<profile>-<branch>`.
pub fn worktree_path(project_root: &Path, profile: &str, branch: &str) -> PathBuf {
    let sanitized = sanitize_branch(branch);
    let mut path = project_root.as_os_str().to_os_string();
    if profile == "default" {
        path.push(format!("-{}", sanitized));
    } else {
        path.push(format!("-{}-{}", profile, sanitized));
    }
    PathBuf::from(path)
}

#[derive(Debug)]
pub struct ProvisionOutcome {
    pub path: PathBuf,
    /// False when the worktree already existed and was reused.
    pub created: bool,
    pub warnings: Vec<String>,
}

/// Provision a worktree for a teammate: create the checkout, build the
/// hybrid state directory, write the identity file. Idempotent when the
/// worktree already exists as a registered checkout.
pub fn provision(
    project_root: &Path,
    main_branch: &str,
    profile: &str,
    team_name: &str,
    teammate: &ResolvedTeammate,
) -> Result<ProvisionOutcome> {
    let repo = Repository::at(project_root);
    let wt_path = worktree_path(project_root, profile, &teammate.branch);
    let mut warnings = Vec::new();

    if wt_path.exists() {
        if !repo.is_registered_worktree(&wt_path)? {
            bail!(
                "{}",
                crate::git::GitError::NotAWorktree {
                    path: wt_path.clone()
                }
            );
        }
        return Ok(ProvisionOutcome {
            path: wt_path,
            created: false,
            warnings,
        });
    }

    if repo.branch_exists_local(&teammate.branch) {
        repo.add_worktree(&wt_path, &teammate.branch)?;
        if let Ok(behind) = repo.behind_count(&teammate.branch, main_branch)
            && behind > BEHIND_WARN_THRESHOLD
        {
            warnings.push(format!(
                "branch '{}' is {} commits behind '{}'",
                teammate.branch, behind, main_branch
            ));
        }
    } else if repo.branch_exists_remote("origin", &teammate.branch) {
        repo.add_worktree_tracking(&wt_path, &teammate.branch, "origin")?;
    } else {
        repo.add_worktree_new_branch(&wt_path, &teammate.branch, main_branch)?;
    }

    build_state_dir(project_root, &wt_path)?;

    let identity = CrewIdentity {
        teammate_name: teammate.name.clone(),
        project_root: project_root.display().to_string(),
        branch: teammate.branch.clone(),
        team_name: team_name.to_string(),
        profile_name: profile.to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    identity.write_to(&wt_path)?;

    Ok(ProvisionOutcome {
        path: wt_path,
        created: true,
        warnings,
    })
}

/// Build the hybrid state directory inside a worktree: a real directory
/// with selective symlinks into the source project's shared tooling, plus
/// local-only subdirectories.
fn build_state_dir(project_root: &Path, wt_path: &Path) -> Result<()> {
    let source_state = project_root.join(STATE_DIR_NAME);
    let wt_state = wt_path.join(STATE_DIR_NAME);
    std::fs::create_dir_all(&wt_state)
        .with_context(|| format!("creating {}", wt_state.display()))?;

    for dir in SHARED_DIRS {
        let source = source_state.join(dir);
        if source.is_dir() {
            link(&source, &wt_state.join(dir))?;
        }
    }
    for file in SHARED_FILES {
        let source = source_state.join(file);
        if source.is_file() {
            link(&source, &wt_state.join(file))?;
        }
    }
    for dir in LOCAL_DIRS {
        std::fs::create_dir_all(wt_state.join(dir))?;
    }
    Ok(())
}

#[cfg(unix)]
fn link(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() || dest.is_symlink() {
        return Ok(());
    }
    let source = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    std::os::unix::fs::symlink(&source, dest)
        .with_context(|| format!("linking {} -> {}", dest.display(), source.display()))
}

#[cfg(windows)]
fn link(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() || dest.is_symlink() {
        return Ok(());
    }
    let source = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(&source, dest)
    } else {
        std::os::windows::fs::symlink_file(&source, dest)
    }
    .with_context(|| format!("linking {} -> {}", dest.display(), source.display()))
}

/// Remove every symlink inside a worktree's state directory.
///
/// Must run before any recursive delete of the worktree; a blind
/// `rm -rf` here is the single most destructive failure mode in the
/// system.
pub fn unlink_state_symlinks(wt_path: &Path) -> Result<()> {
    let wt_state = wt_path.join(STATE_DIR_NAME);
    let Ok(entries) = std::fs::read_dir(&wt_state) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_symlink() {
            remove_symlink(&path).with_context(|| format!("unlinking {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    std::fs::remove_file(path)
}

// Windows distinguishes file and directory symlinks
#[cfg(windows)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    if std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false) {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Remove a worktree: unlink shared-state symlinks, then let git remove
/// the checkout, falling back to direct removal plus administrative prune.
pub fn remove(project_root: &Path, wt_path: &Path) -> Result<()> {
    unlink_state_symlinks(wt_path)?;

    let repo = Repository::at(project_root);
    if repo.remove_worktree(wt_path).is_err() {
        if wt_path.exists() {
            std::fs::remove_dir_all(wt_path)
                .with_context(|| format!("removing {}", wt_path.display()))?;
        }
        // Administrative cleanup; the directory is already gone
        let _ = repo.prune_worktrees();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitization_matches_the_branch_alphabet() {
        assert_eq!(sanitize_branch("feat/a"), "feat--a");
        assert_eq!(sanitize_branch("feat/sub/deep"), "feat--sub--deep");
        assert_eq!(sanitize_branch("fix_1.2-rc"), "fix_1.2-rc");
        assert_eq!(sanitize_branch("weird name!"), "weird_name_");
        assert!(!sanitize_branch("a/b").contains('/'));
    }

    #[test]
    fn worktree_paths_are_deterministic_and_distinct() {
        let root = Path::new("/work/proj");
        assert_eq!(
            worktree_path(root, "default", "feat/a"),
            PathBuf::from("/work/proj-feat--a")
        );
        assert_eq!(
            worktree_path(root, "dev", "feat/a"),
            PathBuf::from("/work/proj-dev-feat--a")
        );
        // Injective over (profile, branch) when sanitized branches differ
        assert_ne!(
            worktree_path(root, "dev", "feat/a"),
            worktree_path(root, "dev", "feat/b")
        );
    }

    #[cfg(unix)]
    #[test]
    fn teardown_unlinks_without_touching_shared_state() {
        let tmp = tempfile::TempDir::new().unwrap();
        let project = tmp.path().join("proj");
        let shared_agents = project.join(STATE_DIR_NAME).join("agents");
        std::fs::create_dir_all(&shared_agents).unwrap();
        std::fs::write(shared_agents.join("helper.md"), "shared").unwrap();

        let wt = tmp.path().join("proj-feat--a");
        build_state_dir(&project, &wt).unwrap();
        assert!(wt.join(STATE_DIR_NAME).join("agents").is_symlink());
        assert!(wt.join(STATE_DIR_NAME).join("sessions").is_dir());

        // Not a git worktree, so removal takes the direct-delete fallback
        remove(&project, &wt).unwrap();

        assert!(!wt.exists());
        // Shared state is bit-identical: the file is still there
        assert_eq!(
            std::fs::read_to_string(shared_agents.join("helper.md")).unwrap(),
            "shared"
        );
    }

    #[cfg(unix)]
    #[test]
    fn state_dir_links_only_present_shared_entries() {
        let tmp = tempfile::TempDir::new().unwrap();
        let project = tmp.path().join("proj");
        std::fs::create_dir_all(project.join(STATE_DIR_NAME).join("skills")).unwrap();
        std::fs::write(
            project.join(STATE_DIR_NAME).join("settings.json"),
            "{}",
        )
        .unwrap();

        let wt = tmp.path().join("proj-x");
        build_state_dir(&project, &wt).unwrap();

        let state = wt.join(STATE_DIR_NAME);
        assert!(state.join("skills").is_symlink());
        assert!(state.join("settings.json").is_symlink());
        // Absent shared dirs are not linked
        assert!(!state.join("agents").exists());
    }
}
