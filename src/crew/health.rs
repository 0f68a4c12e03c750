//! Teammate liveness classification for `cap doctor`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::{TeamState, TeammateState};
use crate::git::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthClass {
    Active,
    Idle,
    Crashed,
    Unresponsive,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRow {
    pub teammate: String,
    pub class: HealthClass,
    pub hours_since_active: Option<f64>,
    pub recent_commits: Option<usize>,
    pub recommendation: String,
}

/// Classify a teammate's liveness.
///
/// - `active`: last activity within the staleness threshold
/// - `idle`: between one and two thresholds
/// - `crashed`: beyond two thresholds with an existing worktree that shows
///   no recent commits
/// - `unresponsive`: beyond the threshold but none of the above (including
///   no recorded activity at all)
pub fn classify(
    teammate: Option<&TeammateState>,
    stale_hours: f64,
    now: DateTime<Utc>,
) -> (HealthClass, Option<f64>, Option<usize>) {
    let Some(teammate) = teammate else {
        return (HealthClass::Unknown, None, None);
    };
    let hours = teammate.hours_since_active(now);
    let recent_commits = teammate
        .worktree_path
        .as_deref()
        .filter(|p| p.exists())
        .and_then(|p| {
            Repository::at(p)
                .recent_commit_count(stale_hours.ceil() as u64)
                .ok()
        });

    let class = match hours {
        Some(h) if h <= stale_hours => HealthClass::Active,
        Some(h) if h <= stale_hours * 2.0 => HealthClass::Idle,
        Some(_) => {
            let worktree_exists = teammate
                .worktree_path
                .as_deref()
                .is_some_and(|p| p.exists());
            if worktree_exists && recent_commits == Some(0) {
                HealthClass::Crashed
            } else {
                HealthClass::Unresponsive
            }
        }
        None => HealthClass::Unresponsive,
    };
    (class, hours, recent_commits)
}

/// Health rows for every teammate in a team state.
pub fn check_profile(state: &TeamState, stale_hours: f64, now: DateTime<Utc>) -> Vec<HealthRow> {
    state
        .teammates
        .iter()
        .map(|(name, teammate)| {
            let (class, hours, commits) = classify(Some(teammate), stale_hours, now);
            HealthRow {
                teammate: name.clone(),
                class,
                hours_since_active: hours,
                recent_commits: commits,
                recommendation: recommendation(class, commits),
            }
        })
        .collect()
}

/// Row for a teammate that exists in config but has no state record.
pub fn unknown_row(name: &str) -> HealthRow {
    HealthRow {
        teammate: name.to_string(),
        class: HealthClass::Unknown,
        hours_since_active: None,
        recent_commits: None,
        recommendation: recommendation(HealthClass::Unknown, None),
    }
}

fn recommendation(class: HealthClass, recent_commits: Option<usize>) -> String {
    match class {
        HealthClass::Active => "healthy".to_string(),
        HealthClass::Idle => "resume with the saved agent id".to_string(),
        HealthClass::Crashed => "spawn fresh and inspect the worktree for stranded work".to_string(),
        HealthClass::Unresponsive => match recent_commits {
            Some(n) if n > 0 => {
                format!("{n} recent commits but no heartbeat; check the agent before respawning")
            }
            _ => "spawn fresh".to_string(),
        },
        HealthClass::Unknown => "not started; run 'cap start'".to_string(),
    }
}
