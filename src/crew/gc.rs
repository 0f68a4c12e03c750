//! Worktree garbage collection.
//!
//! Scans every project-hash directory under the global crew state area for
//! registry entries whose worktrees are orphaned: directory gone, owning
//! team or teammate stopped, or activity past the staleness threshold.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::registry::{WorktreeEntry, WorktreeRegistry};
use super::state::{TeamState, TeammateStatus};
use super::worktree;

#[derive(Debug, Clone, PartialEq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OrphanReason {
    /// Worktree directory no longer exists
    Missing,
    /// Owning team is stopped
    TeamStopped,
    /// Teammate record is stopped
    TeammateStopped,
    /// Last activity is beyond the staleness threshold
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct Orphan {
    pub project_hash: String,
    pub entry: WorktreeEntry,
    pub reason: OrphanReason,
    /// Best-effort disk usage of the worktree directory.
    pub disk_bytes: Option<u64>,
}

#[derive(Debug, Default, Serialize)]
pub struct GcReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GcOptions {
    pub delete_branches: bool,
    pub dry_run: bool,
}

/// Scan all projects under the crew root for orphaned worktrees.
pub fn find_orphans(crew_root: &Path, stale_hours: f64, now: DateTime<Utc>) -> Result<Vec<Orphan>> {
    let mut orphans = Vec::new();
    let Ok(entries) = std::fs::read_dir(crew_root) else {
        return Ok(orphans);
    };

    for project_dir in entries.flatten().filter(|e| e.path().is_dir()) {
        let project_hash = project_dir.file_name().to_string_lossy().into_owned();
        let registry = WorktreeRegistry::load(&project_dir.path())?;
        for entry in registry.worktrees {
            let reason = orphan_reason(&project_dir.path(), &entry, stale_hours, now);
            if let Some(reason) = reason {
                let disk_bytes = dir_size(&entry.path);
                orphans.push(Orphan {
                    project_hash: project_hash.clone(),
                    entry,
                    reason,
                    disk_bytes,
                });
            }
        }
    }
    Ok(orphans)
}

fn orphan_reason(
    project_crew_dir: &Path,
    entry: &WorktreeEntry,
    stale_hours: f64,
    now: DateTime<Utc>,
) -> Option<OrphanReason> {
    if !entry.path.exists() {
        return Some(OrphanReason::Missing);
    }

    let state = TeamState::load(project_crew_dir, &entry.profile).ok().flatten()?;
    if state.status == super::state::TeamStatus::Stopped {
        return Some(OrphanReason::TeamStopped);
    }
    let teammate = state.teammates.get(&entry.name)?;
    if teammate.status == TeammateStatus::Stopped {
        return Some(OrphanReason::TeammateStopped);
    }
    if teammate.is_stale(stale_hours, now) {
        return Some(OrphanReason::Stale);
    }
    None
}

/// Remove orphaned worktrees and their registry entries.
pub fn collect(crew_root: &Path, orphans: &[Orphan], options: GcOptions) -> Result<GcReport> {
    let mut report = GcReport::default();

    for orphan in orphans {
        let entry = &orphan.entry;
        let project_crew_dir = crew_root.join(&orphan.project_hash);

        if options.dry_run {
            continue;
        }

        let project_root = infer_project_root(entry);
        let removal = match (&project_root, entry.path.exists()) {
            (Some(root), _) => worktree::remove(root, &entry.path),
            (None, true) => remove_directly(&entry.path),
            (None, false) => Ok(()),
        };

        match removal {
            Ok(()) => {
                if options.delete_branches
                    && let Some(root) = &project_root
                {
                    let _ = crate::git::Repository::at(root).delete_branch(&entry.branch);
                }
                let mut registry = WorktreeRegistry::load(&project_crew_dir)?;
                registry.remove_path(&entry.path);
                registry.save(&project_crew_dir)?;
                report.removed.push(entry.path.clone());
            }
            Err(e) => report.failed.push((entry.path.clone(), e.to_string())),
        }
    }
    Ok(report)
}

/// No project root to run git from: unlink shared symlinks, then delete
/// the directory.
fn remove_directly(path: &Path) -> Result<()> {
    worktree::unlink_state_symlinks(path)?;
    std::fs::remove_dir_all(path)?;
    Ok(())
}

/// Infer the project root from a worktree path by stripping the
/// deterministic suffix; fall back to walking upward for a primary (non
/// worktree) git checkout.
pub fn infer_project_root(entry: &WorktreeEntry) -> Option<PathBuf> {
    let sanitized = worktree::sanitize_branch(&entry.branch);
    let path_str = entry.path.to_string_lossy();
    let suffixes = [
        format!("-{}-{}", entry.profile, sanitized),
        format!("-{}", sanitized),
    ];
    for suffix in &suffixes {
        if let Some(stripped) = path_str.strip_suffix(suffix.as_str()) {
            let candidate = PathBuf::from(stripped);
            if candidate.join(".git").is_dir() {
                return Some(candidate);
            }
        }
    }

    // Primary checkouts have a .git directory; linked worktrees a .git file
    entry
        .path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join(".git").is_dir())
        .map(Path::to_path_buf)
}

/// Best-effort recursive directory size.
fn dir_size(path: &Path) -> Option<u64> {
    fn walk(path: &Path) -> u64 {
        let Ok(entries) = std::fs::read_dir(path) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| {
                let Ok(meta) = entry.metadata() else { return 0 };
                if meta.is_dir() {
                    walk(&entry.path())
                } else {
                    meta.len()
                }
            })
            .sum()
    }
    path.exists().then(|| walk(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crew::state::{TeamStatus, TeammateState};
    use indexmap::IndexMap;

    fn entry(name: &str, path: &Path, profile: &str) -> WorktreeEntry {
        WorktreeEntry {
            name: name.to_string(),
            branch: format!("feat/{name}"),
            path: path.to_path_buf(),
            created_at: Utc::now().to_rfc3339(),
            profile: profile.to_string(),
        }
    }

    fn write_state(
        crew_dir: &Path,
        profile: &str,
        status: TeamStatus,
        teammates: Vec<(&str, TeammateState)>,
    ) {
        let mut map = IndexMap::new();
        for (name, t) in teammates {
            map.insert(name.to_string(), t);
        }
        let mut state = TeamState {
            team_name: "core".to_string(),
            profile_name: profile.to_string(),
            config_hash: "h".to_string(),
            status,
            started_at: Utc::now().to_rfc3339(),
            updated_at: Utc::now().to_rfc3339(),
            teammates: map,
            spawn_prompts: IndexMap::new(),
        };
        state.save(crew_dir).unwrap();
    }

    fn teammate(path: &Path, status: TeammateStatus, hours_ago: i64) -> TeammateState {
        TeammateState {
            branch: "feat/x".to_string(),
            worktree_path: Some(path.to_path_buf()),
            status,
            agent_id: None,
            last_active: Some((Utc::now() - chrono::Duration::hours(hours_ago)).to_rfc3339()),
        }
    }

    #[test]
    fn missing_directory_is_an_orphan() {
        let tmp = tempfile::TempDir::new().unwrap();
        let crew_root = tmp.path().join("crew");
        let project_dir = crew_root.join("abc123");
        let gone = tmp.path().join("gone-wt");

        let mut registry = WorktreeRegistry::default();
        registry.upsert(entry("alice", &gone, "default"));
        registry.save(&project_dir).unwrap();

        let orphans = find_orphans(&crew_root, 4.0, Utc::now()).unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].reason, OrphanReason::Missing);
    }

    #[test]
    fn stopped_team_and_stale_teammates_are_orphans() {
        let tmp = tempfile::TempDir::new().unwrap();
        let crew_root = tmp.path().join("crew");
        let project_dir = crew_root.join("abc123");
        let wt_a = tmp.path().join("wt-a");
        let wt_b = tmp.path().join("wt-b");
        std::fs::create_dir_all(&wt_a).unwrap();
        std::fs::create_dir_all(&wt_b).unwrap();

        let mut registry = WorktreeRegistry::default();
        registry.upsert(entry("alice", &wt_a, "stopped-profile"));
        registry.upsert(entry("bob", &wt_b, "live-profile"));
        registry.save(&project_dir).unwrap();

        write_state(
            &project_dir,
            "stopped-profile",
            TeamStatus::Stopped,
            vec![("alice", teammate(&wt_a, TeammateStatus::Stopped, 1))],
        );
        write_state(
            &project_dir,
            "live-profile",
            TeamStatus::Active,
            vec![("bob", teammate(&wt_b, TeammateStatus::Idle, 48))],
        );

        let mut orphans = find_orphans(&crew_root, 4.0, Utc::now()).unwrap();
        orphans.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));
        assert_eq!(orphans.len(), 2);
        assert_eq!(orphans[0].reason, OrphanReason::TeamStopped);
        assert_eq!(orphans[1].reason, OrphanReason::Stale);
    }

    #[test]
    fn active_recent_teammates_are_kept() {
        let tmp = tempfile::TempDir::new().unwrap();
        let crew_root = tmp.path().join("crew");
        let project_dir = crew_root.join("abc123");
        let wt = tmp.path().join("wt");
        std::fs::create_dir_all(&wt).unwrap();

        let mut registry = WorktreeRegistry::default();
        registry.upsert(entry("alice", &wt, "default"));
        registry.save(&project_dir).unwrap();
        write_state(
            &project_dir,
            "default",
            TeamStatus::Active,
            vec![("alice", teammate(&wt, TeammateStatus::Active, 1))],
        );

        assert!(find_orphans(&crew_root, 4.0, Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn dry_run_removes_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let crew_root = tmp.path().join("crew");
        let project_dir = crew_root.join("abc123");
        let wt = tmp.path().join("wt");
        std::fs::create_dir_all(&wt).unwrap();

        let mut registry = WorktreeRegistry::default();
        registry.upsert(entry("alice", &wt, "default"));
        registry.save(&project_dir).unwrap();
        write_state(
            &project_dir,
            "default",
            TeamStatus::Stopped,
            vec![("alice", teammate(&wt, TeammateStatus::Stopped, 1))],
        );

        let orphans = find_orphans(&crew_root, 4.0, Utc::now()).unwrap();
        let report = collect(
            &crew_root,
            &orphans,
            GcOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(report.removed.is_empty());
        assert!(wt.exists());
        assert_eq!(WorktreeRegistry::load(&project_dir).unwrap().worktrees.len(), 1);
    }

    #[test]
    fn collect_removes_directory_and_registry_entry() {
        let tmp = tempfile::TempDir::new().unwrap();
        let crew_root = tmp.path().join("crew");
        let project_dir = crew_root.join("abc123");
        let wt = tmp.path().join("wt");
        std::fs::create_dir_all(wt.join("src")).unwrap();
        std::fs::write(wt.join("src/main.rs"), "fn main() {}").unwrap();

        let mut registry = WorktreeRegistry::default();
        registry.upsert(entry("alice", &wt, "default"));
        registry.save(&project_dir).unwrap();
        write_state(
            &project_dir,
            "default",
            TeamStatus::Stopped,
            vec![("alice", teammate(&wt, TeammateStatus::Stopped, 1))],
        );

        let orphans = find_orphans(&crew_root, 4.0, Utc::now()).unwrap();
        assert!(orphans[0].disk_bytes.unwrap() > 0);

        let report = collect(&crew_root, &orphans, GcOptions::default()).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(!wt.exists());
        assert!(WorktreeRegistry::load(&project_dir).unwrap().worktrees.is_empty());
    }
}
