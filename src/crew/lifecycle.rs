//! Crew lifecycle: the end-to-end flows behind `cap init/start/stop/
//! status/doctor`.
//!
//! Each flow is a function over an explicit project root and crew state
//! directory so the whole lifecycle is testable against temp dirs; the CLI
//! wires in the global locations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use indexmap::IndexMap;

use super::config::{CrewConfig, ResolvedProfile};
use super::health::{self, HealthRow};
use super::prompt;
use super::registry::{WorktreeEntry, WorktreeRegistry};
use super::state::{TeamState, TeamStatus, TeammateState, TeammateStatus};
use super::worktree;
use crate::git::Repository;

pub const LEAD_PROMPT_FILE: &str = "lead-prompt.md";

#[derive(Debug)]
pub struct InitOutcome {
    pub path: PathBuf,
    /// False when a config already existed and nothing was written.
    pub created: bool,
}

/// Write a starter `.crew-config.json`, auto-detecting the main branch.
pub fn init(project_root: &Path) -> Result<InitOutcome> {
    let path = CrewConfig::path_for(project_root);
    if path.exists() {
        return Ok(InitOutcome {
            path,
            created: false,
        });
    }
    let main_branch = Repository::at(project_root).detect_main_branch();
    std::fs::write(&path, super::config::template(&main_branch))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(InitOutcome {
        path,
        created: true,
    })
}

#[derive(Debug)]
pub struct StartOutcome {
    pub profile: ResolvedProfile,
    pub config_hash: String,
    pub resume: bool,
    pub lead_prompt: String,
    pub lead_prompt_path: PathBuf,
    /// Per-teammate provisioning problems; the rest of the team proceeds.
    pub teammate_errors: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

/// End-to-end `start`: validate config, provision worktrees, write the
/// registry and team state, generate the lead prompt.
pub fn start(
    project_root: &Path,
    project_crew_dir: &Path,
    selector: Option<&str>,
    fresh_flag: bool,
) -> Result<StartOutcome> {
    let config = CrewConfig::load(project_root)?
        .context("no .crew-config.json found; run 'cap init' first")?;
    let errors = config.validate();
    if !errors.is_empty() {
        bail!("invalid crew config:\n  - {}", errors.join("\n  - "));
    }
    let profile = config.resolve(selector, None)?;
    let config_hash = config.config_hash.clone();
    let now = Utc::now();

    if !Repository::at(project_root).is_repository() {
        bail!(
            "'{}' is not a git repository; crew worktrees need one",
            project_root.display()
        );
    }

    let previous = TeamState::load(project_crew_dir, &profile.profile_name)?;
    let resume = !fresh_flag
        && previous.as_ref().is_some_and(|state| {
            state.config_hash == config_hash
                && state.any_recent_activity(profile.stale_after_hours, now)
        });

    let mut warnings = Vec::new();
    let mut teammate_errors = Vec::new();
    let mut worktrees: Vec<(String, PathBuf)> = Vec::new();
    let mut registry = WorktreeRegistry::load(project_crew_dir)?;

    for teammate in profile.teammates.iter().filter(|t| t.worktree) {
        match worktree::provision(
            project_root,
            &profile.main_branch,
            &profile.profile_name,
            &profile.team_name,
            teammate,
        ) {
            Ok(outcome) => {
                warnings.extend(outcome.warnings);
                registry.upsert(WorktreeEntry {
                    name: teammate.name.clone(),
                    branch: teammate.branch.clone(),
                    path: outcome.path.clone(),
                    created_at: now.to_rfc3339(),
                    profile: profile.profile_name.clone(),
                });
                worktrees.push((teammate.name.clone(), outcome.path));
            }
            Err(e) => teammate_errors.push((teammate.name.clone(), format!("{e:#}"))),
        }
    }
    registry.save(project_crew_dir)?;

    // Build the new team state, carrying agent ids and activity forward
    // for resumed teammates
    let mut teammates = IndexMap::new();
    for teammate in &profile.teammates {
        let carried = if resume {
            previous
                .as_ref()
                .and_then(|state| state.teammates.get(&teammate.name))
                .cloned()
        } else {
            None
        };
        let worktree_path = worktrees
            .iter()
            .find(|(name, _)| name == &teammate.name)
            .map(|(_, path)| path.clone());
        teammates.insert(
            teammate.name.clone(),
            TeammateState {
                branch: teammate.branch.clone(),
                worktree_path,
                status: carried
                    .as_ref()
                    .map(|c| c.status)
                    .unwrap_or(TeammateStatus::Pending),
                agent_id: carried.as_ref().and_then(|c| c.agent_id.clone()),
                last_active: carried.and_then(|c| c.last_active),
            },
        );
    }

    let lead_prompt = if resume {
        let previous = previous.as_ref().expect("resume implies previous state");
        prompt::resume_prompt(
            &profile,
            previous,
            &worktrees,
            project_root,
            profile.stale_after_hours,
            now,
        )
    } else {
        prompt::fresh_prompt(&profile, &worktrees, project_root)
    };

    let mut spawn_prompts = IndexMap::new();
    for teammate in &profile.teammates {
        let wt = worktrees
            .iter()
            .find(|(name, _)| name == &teammate.name)
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| project_root.to_path_buf());
        spawn_prompts.insert(
            teammate.name.clone(),
            prompt::spawn_prompt(teammate, &wt, project_root, &profile.team_name),
        );
    }

    let mut state = TeamState {
        team_name: profile.team_name.clone(),
        profile_name: profile.profile_name.clone(),
        config_hash: config_hash.clone(),
        status: TeamStatus::Active,
        started_at: now.to_rfc3339(),
        updated_at: now.to_rfc3339(),
        teammates,
        spawn_prompts,
    };
    state.save(project_crew_dir)?;

    let lead_prompt_path = project_crew_dir
        .join(&profile.profile_name)
        .join(LEAD_PROMPT_FILE);
    std::fs::write(&lead_prompt_path, &lead_prompt)
        .with_context(|| format!("writing {}", lead_prompt_path.display()))?;

    Ok(StartOutcome {
        profile,
        config_hash,
        resume,
        lead_prompt,
        lead_prompt_path,
        teammate_errors,
        warnings,
    })
}

#[derive(Debug, Default)]
pub struct StopOutcome {
    pub stopped: bool,
    pub removed_worktrees: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Mark a profile stopped and optionally remove its worktrees.
pub fn stop(
    project_root: &Path,
    project_crew_dir: &Path,
    selector: Option<&str>,
    cleanup: bool,
) -> Result<StopOutcome> {
    let profile_name = resolve_profile_name(project_root, selector);
    let Some(mut state) = TeamState::load(project_crew_dir, &profile_name)? else {
        return Ok(StopOutcome::default());
    };

    state.status = TeamStatus::Stopped;
    for teammate in state.teammates.values_mut() {
        teammate.status = TeammateStatus::Stopped;
    }
    state.save(project_crew_dir)?;

    let mut outcome = StopOutcome {
        stopped: true,
        ..Default::default()
    };
    if cleanup {
        let mut registry = WorktreeRegistry::load(project_crew_dir)?;
        for teammate in state.teammates.values() {
            let Some(path) = &teammate.worktree_path else {
                continue;
            };
            match worktree::remove(project_root, path) {
                Ok(()) => {
                    registry.remove_path(path);
                    outcome.removed_worktrees.push(path.clone());
                }
                Err(e) => outcome.errors.push(format!("{}: {e:#}", path.display())),
            }
        }
        registry.save(project_crew_dir)?;
    }
    Ok(outcome)
}

/// Team states for `cap status`: the selected profile, or every profile
/// with saved state.
pub fn status(
    project_root: &Path,
    project_crew_dir: &Path,
    selector: Option<&str>,
) -> Result<Vec<TeamState>> {
    let profiles = match selector {
        Some(profile) => vec![profile.to_string()],
        None => {
            let mut profiles = TeamState::list_profiles(project_crew_dir);
            if profiles.is_empty() {
                profiles = vec![resolve_profile_name(project_root, None)];
            }
            profiles
        }
    };
    let mut states = Vec::new();
    for profile in profiles {
        if let Some(state) = TeamState::load(project_crew_dir, &profile)? {
            states.push(state);
        }
    }
    Ok(states)
}

/// Health rows per profile for `cap doctor`.
pub fn doctor(
    project_root: &Path,
    project_crew_dir: &Path,
    selector: Option<&str>,
) -> Result<Vec<(String, Vec<HealthRow>)>> {
    let config = CrewConfig::load(project_root)?;
    let now = Utc::now();
    let mut out = Vec::new();
    for state in status(project_root, project_crew_dir, selector)? {
        let stale_hours = config
            .as_ref()
            .map(|c| c.stale_hours_for(&state.profile_name))
            .unwrap_or(super::config::DEFAULT_STALE_HOURS);
        let mut rows = health::check_profile(&state, stale_hours, now);

        // Config teammates with no state record at all classify as unknown
        if let Some(config) = &config
            && let Ok(profile) = config.resolve(Some(&state.profile_name), None)
        {
            for teammate in &profile.teammates {
                if !state.teammates.contains_key(&teammate.name) {
                    rows.push(health::unknown_row(&teammate.name));
                }
            }
        }
        out.push((state.profile_name.clone(), rows));
    }
    Ok(out)
}

/// Teammate branches for the merge pilot, from the profile's team state
/// (falling back to the config when no state exists).
pub fn merge_branches(
    project_root: &Path,
    project_crew_dir: &Path,
    selector: Option<&str>,
) -> Result<(String, Vec<(String, String)>)> {
    let config = CrewConfig::load(project_root)?
        .context("no .crew-config.json found; run 'cap init' first")?;
    let profile = config.resolve(selector, None)?;

    let branches = match TeamState::load(project_crew_dir, &profile.profile_name)? {
        Some(state) => state
            .teammates
            .iter()
            .map(|(name, t)| (name.clone(), t.branch.clone()))
            .collect(),
        None => profile
            .teammates
            .iter()
            .map(|t| (t.name.clone(), t.branch.clone()))
            .collect(),
    };
    Ok((profile.main_branch, branches))
}

fn resolve_profile_name(project_root: &Path, selector: Option<&str>) -> String {
    if let Some(name) = selector {
        return name.to_string();
    }
    CrewConfig::load(project_root)
        .ok()
        .flatten()
        .and_then(|config| config.select_profile(None).ok().map(|(name, _)| name))
        .unwrap_or_else(|| "default".to_string())
}
