//! Per-project worktree registry.
//!
//! `<config>/crew/<project_hash>/worktrees.json` is the authoritative list
//! of active crew worktrees for a project. The identity resolver uses it to
//! disambiguate which teammate a tool event belongs to, and the GC uses it
//! to find orphans. Writers do plain read-modify-write; `start`/`stop` are
//! user-driven and not expected to race.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const REGISTRY_FILE: &str = "worktrees.json";

fn default_profile() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreeEntry {
    pub name: String,
    pub branch: String,
    pub path: PathBuf,
    pub created_at: String,
    /// Owning profile; defaults for registries written before the field
    /// existed.
    #[serde(default = "default_profile")]
    pub profile: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreeRegistry {
    pub worktrees: Vec<WorktreeEntry>,
}

impl WorktreeRegistry {
    /// Load the registry for a project crew directory; missing file is an
    /// empty registry.
    pub fn load(project_crew_dir: &Path) -> Result<Self> {
        let path = project_crew_dir.join(REGISTRY_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Write the registry back to disk, creating the directory on demand.
    pub fn save(&self, project_crew_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(project_crew_dir)
            .with_context(|| format!("creating {}", project_crew_dir.display()))?;
        let path = project_crew_dir.join(REGISTRY_FILE);
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Insert or replace the entry with the same teammate name.
    pub fn upsert(&mut self, entry: WorktreeEntry) {
        self.worktrees.retain(|e| e.name != entry.name);
        self.worktrees.push(entry);
    }

    /// Remove the entry registered at the given worktree path.
    pub fn remove_path(&mut self, path: &Path) {
        self.worktrees.retain(|e| e.path != path);
    }

    pub fn find_by_name(&self, name: &str) -> Option<&WorktreeEntry> {
        self.worktrees.iter().find(|e| e.name == name)
    }

    /// Find the entry whose worktree path is a prefix of the given file
    /// path. Longest prefix wins so nested layouts resolve correctly.
    pub fn find_for_file(&self, file_path: &Path) -> Option<&WorktreeEntry> {
        self.worktrees
            .iter()
            .filter(|e| file_path.starts_with(&e.path))
            .max_by_key(|e| e.path.as_os_str().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, path: &str) -> WorktreeEntry {
        WorktreeEntry {
            name: name.to_string(),
            branch: format!("feat/{name}"),
            path: PathBuf::from(path),
            created_at: "2025-01-01T00:00:00+00:00".to_string(),
            profile: "default".to_string(),
        }
    }

    #[test]
    fn load_missing_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let reg = WorktreeRegistry::load(tmp.path()).unwrap();
        assert!(reg.worktrees.is_empty());
    }

    #[test]
    fn round_trips_and_upserts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut reg = WorktreeRegistry::default();
        reg.upsert(entry("alice", "/p-feat--a"));
        reg.upsert(entry("alice", "/p-feat--a2"));
        reg.save(tmp.path()).unwrap();

        let loaded = WorktreeRegistry::load(tmp.path()).unwrap();
        assert_eq!(loaded.worktrees.len(), 1);
        assert_eq!(loaded.worktrees[0].path, PathBuf::from("/p-feat--a2"));
    }

    #[test]
    fn file_prefix_match_prefers_longest() {
        let mut reg = WorktreeRegistry::default();
        reg.upsert(entry("a", "/work/p-feat"));
        reg.upsert(entry("b", "/work/p-feat-deep"));
        let found = reg
            .find_for_file(Path::new("/work/p-feat-deep/src/main.rs"))
            .unwrap();
        assert_eq!(found.name, "b");
        assert!(reg.find_for_file(Path::new("/elsewhere/x")).is_none());
    }

    #[test]
    fn profile_field_defaults_on_legacy_registries() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(REGISTRY_FILE),
            r#"{"worktrees":[{"name":"a","branch":"b","path":"/x","created_at":"t"}]}"#,
        )
        .unwrap();
        let reg = WorktreeRegistry::load(tmp.path()).unwrap();
        assert_eq!(reg.worktrees[0].profile, "default");
    }
}
