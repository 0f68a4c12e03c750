//! Lead and teammate prompt generation.
//!
//! Pure functions over (profile, team state, worktree map): nothing here
//! touches disk or git. The lead prompt tells the user (or the host agent)
//! how to launch or resume the crew; each teammate's spawn prompt is the
//! contract that keeps it inside its own worktree.

use std::path::Path;

use chrono::{DateTime, Utc};

use super::config::{ResolvedProfile, ResolvedTeammate};
use super::state::TeamState;

/// Placeholder substitution applied to focus text.
fn substitute(text: &str, worktree: &str, project_root: &str, teammate: &str) -> String {
    text.replace("{WORKTREE_PATH}", worktree)
        .replace("{PROJECT_ROOT}", project_root)
        .replace("{TEAMMATE_NAME}", teammate)
}

/// The per-teammate spawn prompt: identity, path rules, focus, workflow.
pub fn spawn_prompt(
    teammate: &ResolvedTeammate,
    worktree_path: &Path,
    project_root: &Path,
    team_name: &str,
) -> String {
    let wt = worktree_path.display().to_string();
    let root = project_root.display().to_string();
    let focus = substitute(&teammate.focus, &wt, &root, &teammate.name);
    let focus_block = if focus.is_empty() {
        String::new()
    } else {
        format!("\n## Focus\n\n{focus}\n")
    };

    format!(
        "You are **{name}**, a teammate on team **{team}**.\n\
         Your branch: `{branch}`\n\
         Your worktree: `{wt}`\n\
         \n\
         ## Path Rules\n\
         \n\
         | Operation | Allowed | Forbidden |\n\
         |---|---|---|\n\
         | Read | `{wt}/**` | `{root}/**` |\n\
         | Write/Edit | `{wt}/**` | `{root}/**` |\n\
         | Shell cwd | `{wt}` | `{root}` |\n\
         | git commit/push | branch `{branch}` only | any other branch |\n\
         \n\
         Every tool invocation must use absolute paths under your worktree.\n\
         Never touch paths under the lead's project root.\n\
         {focus_block}\
         \n\
         ## Workflow\n\
         \n\
         1. Claim the task assigned to **{name}**.\n\
         2. Work on it inside your worktree, committing to `{branch}`.\n\
         3. Mark the task complete with a short result summary.\n\
         4. Poll for the next unassigned task; stop when none remain.\n",
        name = teammate.name,
        team = team_name,
        branch = teammate.branch,
        wt = wt,
        root = root,
        focus_block = focus_block,
    )
}

/// The lead prompt for a fresh launch: scripted team setup plus one
/// parallel spawn block per teammate.
pub fn fresh_prompt(
    profile: &ResolvedProfile,
    worktrees: &[(String, std::path::PathBuf)],
    project_root: &Path,
) -> String {
    let mut doc = format!(
        "# Launch crew '{team}' (profile `{profile}`)\n\n\
         ## Step 1 — create the team\n\n\
         Create a team container named `{team}`.\n\n\
         ## Step 2 — create tasks\n\n",
        team = profile.team_name,
        profile = profile.profile_name,
    );
    for teammate in &profile.teammates {
        doc.push_str(&format!(
            "- Task for **{}**: work on branch `{}`\n",
            teammate.name, teammate.branch
        ));
    }

    doc.push_str(
        "\n## Step 3 — spawn teammates in parallel\n\n\
         Issue ALL spawn invocations in a single message, one per teammate:\n\n",
    );
    for teammate in &profile.teammates {
        let wt = worktrees
            .iter()
            .find(|(name, _)| name == &teammate.name)
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| project_root.to_path_buf());
        doc.push_str(&format!(
            "### Spawn `{name}`\n\n\
             - name: {name}\n\
             - team: {team}\n\
             - subagent_type: {subagent}\n\
             - mode: {mode}\n\
             - model: {model}\n\
             - prompt:\n\n```\n{prompt}```\n\n",
            name = teammate.name,
            team = profile.team_name,
            subagent = teammate.subagent_type,
            mode = teammate.mode,
            model = teammate.model,
            prompt = spawn_prompt(teammate, &wt, project_root, &profile.team_name),
        ));
    }

    doc.push_str("Then assign each task to its teammate by name.\n");
    doc
}

/// The lead prompt for resuming an existing team: per-teammate resume or
/// respawn instructions.
pub fn resume_prompt(
    profile: &ResolvedProfile,
    state: &TeamState,
    worktrees: &[(String, std::path::PathBuf)],
    project_root: &Path,
    stale_hours: f64,
    now: DateTime<Utc>,
) -> String {
    let most_recent = state
        .teammates
        .values()
        .filter_map(|t| t.hours_since_active(now))
        .fold(f64::INFINITY, f64::min);
    let age = if most_recent.is_finite() {
        format!("{most_recent:.1} hours since last activity")
    } else {
        "no recorded activity".to_string()
    };

    let mut doc = format!(
        "# Resume crew '{team}' (profile `{profile}`) — {age}\n\n",
        team = profile.team_name,
        profile = profile.profile_name,
    );

    for teammate in &profile.teammates {
        let saved = state.teammates.get(&teammate.name);
        let wt = worktrees
            .iter()
            .find(|(name, _)| name == &teammate.name)
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| project_root.to_path_buf());

        let resumable = saved.is_some_and(|s| {
            s.agent_id.is_some() && !s.is_stale(stale_hours, now)
        });
        doc.push_str(&format!(
            "## {name}\n\n- branch: `{branch}`\n- worktree: `{wt}`\n",
            name = teammate.name,
            branch = teammate.branch,
            wt = wt.display(),
        ));
        if resumable {
            let agent_id = saved
                .and_then(|s| s.agent_id.as_deref())
                .unwrap_or_default();
            doc.push_str(&format!(
                "- agent: `{agent_id}`\n- action: resume the saved agent\n\n"
            ));
        } else {
            doc.push_str(
                "- agent: STALE — spawn fresh\n- action: spawn with the prompt below\n\n",
            );
            doc.push_str(&format!(
                "```\n{}```\n\n",
                spawn_prompt(teammate, &wt, project_root, &profile.team_name)
            ));
        }
    }
    doc
}
