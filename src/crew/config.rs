//! Crew configuration: load, validate, hash, resolve.
//!
//! `.crew-config.json` at the project root declares either a single `team`
//! or a map of named `profiles`. Loading is permissive (unknown fields are
//! ignored, key order preserved); validation returns precise human
//! messages; the config hash is computed over a canonical key-sorted
//! serialization so it is invariant under whitespace and key ordering.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::roles;
use crate::identity::sha12;

pub const CONFIG_FILE: &str = ".crew-config.json";

/// Default staleness threshold in hours.
pub const DEFAULT_STALE_HOURS: f64 = 4.0;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeammateDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default = "default_true")]
    pub worktree: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewGroupDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub teammates: Vec<TeammateDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub teammates: Vec<TeammateDef>,
    #[serde(default)]
    pub crews: Vec<CrewGroupDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_after_hours: Option<f64>,
}

impl TeamDef {
    /// All teammates, flat list and crew groups combined, each with its
    /// crew name attached (flat teammates belong to crew "default").
    pub fn all_teammates(&self) -> Vec<(String, &TeammateDef)> {
        let mut out: Vec<(String, &TeammateDef)> = self
            .teammates
            .iter()
            .map(|t| ("default".to_string(), t))
            .collect();
        for crew in &self.crews {
            let crew_name = if crew.name.is_empty() {
                "default".to_string()
            } else {
                crew.name.clone()
            };
            out.extend(crew.teammates.iter().map(|t| (crew_name.clone(), t)));
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_branch: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<IndexMap<String, TeamDef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_after_hours: Option<f64>,

    /// Hash of the canonical serialization, set on load.
    #[serde(skip)]
    pub config_hash: String,
}

/// One teammate after profile resolution and role-preset application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTeammate {
    pub name: String,
    pub branch: String,
    pub worktree: bool,
    pub crew: String,
    pub model: String,
    pub mode: String,
    pub subagent_type: String,
    pub focus: String,
}

/// A selected profile with presets applied and crews flattened.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub profile_name: String,
    pub team_name: String,
    pub main_branch: String,
    pub stale_after_hours: f64,
    pub teammates: Vec<ResolvedTeammate>,
}

impl CrewConfig {
    /// Path of the config file for a project root.
    pub fn path_for(project_root: &Path) -> std::path::PathBuf {
        project_root.join(CONFIG_FILE)
    }

    /// Load the config from a project root. `Ok(None)` when no config file
    /// exists.
    pub fn load(project_root: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(project_root);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let value: Value =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(Self::from_value(value)?))
    }

    /// Build a config from a parsed JSON value, computing the canonical
    /// hash from the full document (not the resolved subset).
    pub fn from_value(value: Value) -> Result<Self> {
        let hash = hash_value(&value);
        let mut config: CrewConfig =
            serde_json::from_value(value).context("invalid crew config shape")?;
        config.config_hash = hash;
        Ok(config)
    }

    /// The profile map view: a single `team` behaves as a sole profile
    /// named `default`.
    pub fn profile_map(&self) -> IndexMap<String, &TeamDef> {
        let mut map = IndexMap::new();
        if let Some(team) = &self.team {
            map.insert("default".to_string(), team);
        } else if let Some(profiles) = &self.profiles {
            for (name, team) in profiles {
                map.insert(name.clone(), team);
            }
        }
        map
    }

    /// Validate the config. Empty result means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match (&self.team, &self.profiles) {
            (None, None) => {
                errors.push("config must declare either 'team' or 'profiles'".to_string());
                return errors;
            }
            (Some(_), Some(_)) => {
                errors.push("config must declare exactly one of 'team' or 'profiles'".to_string());
                return errors;
            }
            _ => {}
        }

        if let Some(profiles) = &self.profiles {
            if profiles.is_empty() {
                errors.push("'profiles' must not be empty".to_string());
            }
            if let Some(default) = &self.default
                && !profiles.contains_key(default)
            {
                errors.push(format!(
                    "default profile '{}' does not exist in 'profiles'",
                    default
                ));
            }
        }

        for (profile_name, team) in self.profile_map() {
            let ctx = format!("profile '{}'", profile_name);
            if team.name.trim().is_empty() {
                errors.push(format!("{}: team name must be a non-empty string", ctx));
            }
            let teammates = team.all_teammates();
            if teammates.is_empty() {
                errors.push(format!("{}: teammates must be a non-empty list", ctx));
            }
            let mut seen = std::collections::HashSet::new();
            for (_, teammate) in &teammates {
                if teammate.name.trim().is_empty() {
                    errors.push(format!("{}: every teammate needs a 'name'", ctx));
                    continue;
                }
                if teammate.branch.trim().is_empty() {
                    errors.push(format!(
                        "{}: teammate '{}' needs a 'branch'",
                        ctx, teammate.name
                    ));
                }
                if !seen.insert(teammate.name.clone()) {
                    errors.push(format!(
                        "{}: duplicate teammate name '{}'",
                        ctx, teammate.name
                    ));
                }
                if let Some(role) = &teammate.role
                    && roles::preset(role).is_none()
                {
                    errors.push(format!(
                        "{}: teammate '{}' has unknown role '{}' (known: {})",
                        ctx,
                        teammate.name,
                        role,
                        roles::KNOWN_ROLES.join(", ")
                    ));
                }
            }
        }

        errors
    }

    /// Select a profile: explicit argument, then the config's `default`,
    /// then the first profile.
    pub fn select_profile(&self, selector: Option<&str>) -> Result<(String, &TeamDef)> {
        let map = self.profile_map();
        let name = match selector {
            Some(name) => name.to_string(),
            None => self
                .default
                .clone()
                .or_else(|| map.keys().next().cloned())
                .context("config has no profiles")?,
        };
        match map.get(&name) {
            Some(team) => Ok((name, *team)),
            None => anyhow::bail!(
                "unknown profile '{}' (available: {})",
                name,
                map.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    /// Resolve a profile into its flattened teammate list with role presets
    /// applied, optionally filtered to one crew.
    pub fn resolve(
        &self,
        selector: Option<&str>,
        crew_filter: Option<&str>,
    ) -> Result<ResolvedProfile> {
        let (profile_name, team) = self.select_profile(selector)?;
        let stale_after_hours = team
            .stale_after_hours
            .or(self.stale_after_hours)
            .unwrap_or(DEFAULT_STALE_HOURS);
        let main_branch = self
            .project
            .as_ref()
            .and_then(|p| p.main_branch.clone())
            .unwrap_or_else(|| "main".to_string());

        let teammates = team
            .all_teammates()
            .into_iter()
            .filter(|(crew, _)| crew_filter.is_none_or(|f| f == crew.as_str()))
            .map(|(crew, t)| resolve_teammate(crew, t))
            .collect();

        Ok(ResolvedProfile {
            profile_name,
            team_name: team.name.clone(),
            main_branch,
            stale_after_hours,
            teammates,
        })
    }

    /// The staleness threshold for a profile, falling back to the top-level
    /// setting and then the default.
    pub fn stale_hours_for(&self, profile: &str) -> f64 {
        self.profile_map()
            .get(profile)
            .and_then(|t| t.stale_after_hours)
            .or(self.stale_after_hours)
            .unwrap_or(DEFAULT_STALE_HOURS)
    }
}

fn resolve_teammate(crew: String, t: &TeammateDef) -> ResolvedTeammate {
    let preset = t.role.as_deref().and_then(roles::preset);
    let focus = match (&preset, t.focus.as_deref()) {
        (Some(p), Some(user)) => format!("{} {}", p.focus_prefix, user),
        (Some(p), None) => p.focus_prefix.to_string(),
        (None, Some(user)) => user.to_string(),
        (None, None) => String::new(),
    };
    ResolvedTeammate {
        name: t.name.clone(),
        branch: t.branch.clone(),
        worktree: t.worktree,
        crew,
        model: t
            .model
            .clone()
            .or(preset.map(|p| p.model.to_string()))
            .unwrap_or_else(|| "sonnet".to_string()),
        mode: t
            .mode
            .clone()
            .or(preset.map(|p| p.mode.to_string()))
            .unwrap_or_else(|| "default".to_string()),
        subagent_type: t
            .subagent_type
            .clone()
            .or(preset.map(|p| p.subagent_type.to_string()))
            .unwrap_or_else(|| "general-purpose".to_string()),
        focus,
    }
}

/// Canonical JSON: objects recursively key-sorted, rendered without
/// insignificant whitespace.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// First 12 hex chars of a SHA-256 over the canonical serialization.
pub fn hash_value(value: &Value) -> String {
    let canonical = serde_json::to_string(&canonicalize(value)).unwrap_or_default();
    sha12(&canonical)
}

/// Render a starter config for `cap init`.
pub fn template(main_branch: &str) -> String {
    serde_json::to_string_pretty(&serde_json::json!({
        "team": {
            "name": "core",
            "teammates": [
                { "name": "alice", "branch": "feat/alice", "role": "developer" },
                { "name": "bob", "branch": "feat/bob", "role": "reviewer" }
            ]
        },
        "project": { "main_branch": main_branch },
        "stale_after_hours": DEFAULT_STALE_HOURS
    }))
    .expect("static template serializes")
        + "\n"
}
