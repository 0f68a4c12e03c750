//! Persistent per-profile team state.
//!
//! `<config>/crew/<project_hash>/<profile>/team-state.json` is the single
//! source of truth for resumable crew sessions: which teammates exist,
//! their agent ids, and when they were last active. The `config_hash`
//! field gates resumption: a changed config forces a fresh start.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const STATE_FILE: &str = "team-state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStatus {
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeammateStatus {
    Pending,
    Active,
    Idle,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeammateState {
    pub branch: String,
    #[serde(default)]
    pub worktree_path: Option<PathBuf>,
    pub status: TeammateStatus,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub last_active: Option<String>,
}

impl TeammateState {
    /// Hours since this teammate was last active, when known.
    pub fn hours_since_active(&self, now: DateTime<Utc>) -> Option<f64> {
        let last = self.last_active.as_ref()?;
        let parsed = DateTime::parse_from_rfc3339(last).ok()?;
        Some((now - parsed.with_timezone(&Utc)).num_seconds() as f64 / 3600.0)
    }

    /// Whether the teammate's last activity is beyond the threshold (or
    /// unknown entirely).
    pub fn is_stale(&self, stale_hours: f64, now: DateTime<Utc>) -> bool {
        match self.hours_since_active(now) {
            Some(hours) => hours > stale_hours,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamState {
    pub team_name: String,
    pub profile_name: String,
    pub config_hash: String,
    pub status: TeamStatus,
    pub started_at: String,
    pub updated_at: String,
    pub teammates: IndexMap<String, TeammateState>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub spawn_prompts: IndexMap<String, String>,
}

impl TeamState {
    pub fn state_path(project_crew_dir: &Path, profile: &str) -> PathBuf {
        project_crew_dir.join(profile).join(STATE_FILE)
    }

    /// Load a profile's team state, migrating the legacy flat file into
    /// `default/` on first read. `Ok(None)` when no state exists.
    pub fn load(project_crew_dir: &Path, profile: &str) -> Result<Option<Self>> {
        migrate_legacy(project_crew_dir)?;
        let path = Self::state_path(project_crew_dir, profile);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let state =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(state))
    }

    /// Write the team state, refreshing `updated_at`.
    pub fn save(&mut self, project_crew_dir: &Path) -> Result<()> {
        self.updated_at = Utc::now().to_rfc3339();
        let path = Self::state_path(project_crew_dir, &self.profile_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Profiles with saved state under a project crew directory.
    pub fn list_profiles(project_crew_dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(project_crew_dir) else {
            return Vec::new();
        };
        let mut profiles: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().join(STATE_FILE).exists())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        profiles.sort();
        profiles
    }

    /// Whether any teammate has been active within the staleness window.
    pub fn any_recent_activity(&self, stale_hours: f64, now: DateTime<Utc>) -> bool {
        self.teammates
            .values()
            .any(|t| !t.is_stale(stale_hours, now))
    }
}

/// Move the legacy flat `team-state.json` into `default/` if present and
/// not already migrated.
fn migrate_legacy(project_crew_dir: &Path) -> Result<()> {
    let legacy = project_crew_dir.join(STATE_FILE);
    if !legacy.is_file() {
        return Ok(());
    }
    let target = project_crew_dir.join("default").join(STATE_FILE);
    if target.exists() {
        // Both exist: keep the new location, drop the stale flat file
        std::fs::remove_file(&legacy)?;
        return Ok(());
    }
    std::fs::create_dir_all(target.parent().expect("state path has parent"))?;
    std::fs::rename(&legacy, &target)
        .with_context(|| format!("migrating {} to {}", legacy.display(), target.display()))?;
    log::info!("migrated legacy team state to {}", target.display());
    Ok(())
}
