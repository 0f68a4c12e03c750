//! Crew lifecycle end-to-end: start, resume, stop, merge preview, GC.
//!
//! These drive the library against real git repositories in temp dirs.

mod common;

use std::path::Path;

use capkit::crew::config::CrewConfig;
use capkit::crew::gc::{self, GcOptions};
use capkit::crew::lifecycle;
use capkit::crew::merge;
use capkit::crew::registry::WorktreeRegistry;
use capkit::crew::state::{TeamState, TeamStatus, TeammateStatus};
use capkit::identity::CrewIdentity;
use chrono::Utc;
use common::{commit_file, git, init_repo};
use tempfile::TempDir;

const DEV_CONFIG: &str = r#"{
  "profiles": {
    "dev": {
      "name": "dev-team",
      "teammates": [
        { "name": "alice", "branch": "feat/a", "role": "developer" },
        { "name": "bob", "branch": "feat/b", "role": "reviewer" }
      ]
    }
  },
  "default": "dev",
  "project": { "main_branch": "main" }
}"#;

fn setup() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    // Keep the repo one level down so sibling worktrees land inside tmp
    let root = tmp.path().join("work").join("proj");
    init_repo(&root);
    std::fs::write(root.join(".crew-config.json"), DEV_CONFIG).unwrap();
    let crew_dir = tmp.path().join("crew-state");
    (tmp, root, crew_dir)
}

#[test]
fn start_on_empty_state_provisions_everything() {
    let (_tmp, root, crew_dir) = setup();
    let outcome = lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();
    assert!(!outcome.resume);
    assert!(outcome.teammate_errors.is_empty(), "{:?}", outcome.teammate_errors);

    let wt_a = Path::new(&format!("{}-dev-feat--a", root.display())).to_path_buf();
    let wt_b = Path::new(&format!("{}-dev-feat--b", root.display())).to_path_buf();
    assert!(wt_a.is_dir());
    assert!(wt_b.is_dir());

    // Identity files are local, never symlinks
    for (wt, name) in [(&wt_a, "alice"), (&wt_b, "bob")] {
        let identity_path = wt.join("crew-identity.json");
        assert!(identity_path.is_file());
        assert!(!identity_path.is_symlink());
        let identity = CrewIdentity::read_from(wt).unwrap();
        assert_eq!(identity.teammate_name, name);
        assert_eq!(identity.profile_name, "dev");
        assert_eq!(identity.team_name, "dev-team");
    }

    let registry = WorktreeRegistry::load(&crew_dir).unwrap();
    assert_eq!(registry.worktrees.len(), 2);
    assert!(registry.find_by_name("alice").is_some());

    let state = TeamState::load(&crew_dir, "dev").unwrap().unwrap();
    assert_eq!(state.status, TeamStatus::Active);
    let config = CrewConfig::load(&root).unwrap().unwrap();
    assert_eq!(state.config_hash, config.config_hash);
    assert!(
        state
            .teammates
            .values()
            .all(|t| t.status == TeammateStatus::Pending && t.agent_id.is_none())
    );

    // The lead prompt is a fresh launch with parallel spawn blocks
    assert!(outcome.lead_prompt.contains("Spawn `alice`"));
    assert!(outcome.lead_prompt.contains("parallel"));
    assert!(outcome.lead_prompt_path.is_file());
}

#[test]
fn restart_is_idempotent_and_fresh_refreshes_state() {
    let (_tmp, root, crew_dir) = setup();
    let first = lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();
    let first_state = TeamState::load(&crew_dir, "dev").unwrap().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(50));
    let second = lifecycle::start(&root, &crew_dir, Some("dev"), true).unwrap();
    assert!(!second.resume, "--fresh forces a fresh launch");
    assert!(second.teammate_errors.is_empty(), "{:?}", second.teammate_errors);

    let registry = WorktreeRegistry::load(&crew_dir).unwrap();
    assert_eq!(registry.worktrees.len(), 2, "registry entries are stable");

    let second_state = TeamState::load(&crew_dir, "dev").unwrap().unwrap();
    assert_eq!(second_state.config_hash, first.config_hash);
    assert_eq!(second_state.config_hash, second.config_hash);
    assert!(second_state.started_at > first_state.started_at);
}

#[test]
fn resume_carries_agent_ids_forward() {
    let (_tmp, root, crew_dir) = setup();
    lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();

    // Simulate a running teammate
    let mut state = TeamState::load(&crew_dir, "dev").unwrap().unwrap();
    let alice = state.teammates.get_mut("alice").unwrap();
    alice.agent_id = Some("agent-123".to_string());
    alice.last_active = Some(Utc::now().to_rfc3339());
    alice.status = TeammateStatus::Active;
    state.save(&crew_dir).unwrap();

    let outcome = lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();
    assert!(outcome.resume);
    let state = TeamState::load(&crew_dir, "dev").unwrap().unwrap();
    assert_eq!(state.teammates["alice"].agent_id.as_deref(), Some("agent-123"));
    assert_eq!(state.teammates["bob"].status, TeammateStatus::Pending);
    assert!(outcome.lead_prompt.contains("Resume crew"));
    assert!(outcome.lead_prompt.contains("agent-123"));
}

#[test]
fn config_change_forces_fresh() {
    let (_tmp, root, crew_dir) = setup();
    lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();

    let mut state = TeamState::load(&crew_dir, "dev").unwrap().unwrap();
    state.teammates.get_mut("alice").unwrap().last_active = Some(Utc::now().to_rfc3339());
    state.teammates.get_mut("alice").unwrap().agent_id = Some("a".to_string());
    state.save(&crew_dir).unwrap();

    // Add a teammate: hash changes, resume is off the table
    let changed = DEV_CONFIG.replace(
        r#"{ "name": "bob", "branch": "feat/b", "role": "reviewer" }"#,
        r#"{ "name": "bob", "branch": "feat/b", "role": "reviewer" },
        { "name": "carol", "branch": "feat/c", "role": "tester" }"#,
    );
    std::fs::write(root.join(".crew-config.json"), changed).unwrap();

    let outcome = lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();
    assert!(!outcome.resume);
}

#[test]
fn invalid_config_refuses_to_start() {
    let (_tmp, root, crew_dir) = setup();
    std::fs::write(
        root.join(".crew-config.json"),
        r#"{"profiles":{"dev":{"name":"d","teammates":[{"name":"x","branch":"y","role":"wizard"}]}}}"#,
    )
    .unwrap();
    let err = lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap_err();
    assert!(err.to_string().contains("unknown role"));
}

#[test]
fn merge_preview_flags_overlap_and_conflict() {
    let (_tmp, root, crew_dir) = setup();
    commit_file(&root, "src/core.ts", "base\n", "add core");

    git(&root, &["checkout", "-b", "feat/a"]);
    commit_file(&root, "src/core.ts", "alice version\n", "alice change");
    git(&root, &["checkout", "main"]);
    git(&root, &["checkout", "-b", "feat/b"]);
    commit_file(&root, "src/core.ts", "bob version\n", "bob change");
    git(&root, &["checkout", "main"]);

    let (main_branch, branches) = lifecycle::merge_branches(&root, &crew_dir, Some("dev")).unwrap();
    assert_eq!(main_branch, "main");
    let previews = merge::preview(&root, &main_branch, &branches);
    assert_eq!(previews.len(), 2);
    assert!(
        previews
            .iter()
            .any(|p| p.status == merge::BranchStatus::Conflict),
        "both touched src/core.ts with different content: {previews:?}"
    );

    let overlaps = merge::detect_overlaps(&previews);
    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].files, vec!["src/core.ts"]);
}

#[test]
fn merge_execute_merges_clean_branch_and_tags_backup() {
    let (_tmp, root, crew_dir) = setup();
    git(&root, &["checkout", "-b", "feat/a"]);
    commit_file(&root, "src/alice.ts", "alice\n", "alice adds a file");
    git(&root, &["checkout", "main"]);

    let branches = vec![("alice".to_string(), "feat/a".to_string())];
    let previews = merge::preview(&root, "main", &branches);
    assert_eq!(previews[0].status, merge::BranchStatus::Clean);

    let report = merge::execute(&root, "main", &previews, &merge::MergeOptions::default()).unwrap();
    assert_eq!(report.success, vec!["feat/a"]);
    assert!(report.backup_tag.as_deref().unwrap().starts_with("crew-backup-"));
    assert!(root.join("src/alice.ts").exists());
    let _ = crew_dir;
}

#[test]
fn missing_branch_is_an_error_row() {
    let (_tmp, root, _crew_dir) = setup();
    let branches = vec![("ghost".to_string(), "feat/ghost".to_string())];
    let previews = merge::preview(&root, "main", &branches);
    assert_eq!(previews[0].status, merge::BranchStatus::Error);
    assert!(previews[0].message.as_deref().unwrap().contains("does not exist"));
}

#[test]
fn stop_without_cleanup_leaves_orphans_for_gc() {
    let (tmp, root, _) = setup();
    // GC scans <crew_root>/<project_hash>, so use that exact layout here
    let crew_root = tmp.path().join("crew-root");
    let hash = capkit::identity::project_hash(&root);
    let crew_dir = crew_root.join(&hash);

    lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();
    let outcome = lifecycle::stop(&root, &crew_dir, Some("dev"), false).unwrap();
    assert!(outcome.stopped);
    assert!(outcome.removed_worktrees.is_empty());

    let state_before = TeamState::load(&crew_dir, "dev").unwrap().unwrap();
    assert_eq!(state_before.status, TeamStatus::Stopped);

    let orphans = gc::find_orphans(&crew_root, 4.0, Utc::now()).unwrap();
    assert_eq!(orphans.len(), 2, "both stopped teammates are orphans");

    let report = gc::collect(&crew_root, &orphans, GcOptions::default()).unwrap();
    assert_eq!(report.removed.len(), 2, "{:?}", report.failed);
    for orphan in &orphans {
        assert!(!orphan.entry.path.exists());
    }
    assert!(WorktreeRegistry::load(&crew_dir).unwrap().worktrees.is_empty());

    // TeamState is untouched by GC
    let state_after = TeamState::load(&crew_dir, "dev").unwrap().unwrap();
    assert_eq!(state_after.updated_at, state_before.updated_at);
}

#[test]
fn stop_with_cleanup_removes_worktrees_and_registry() {
    let (tmp, root, _) = setup();
    let crew_root = tmp.path().join("crew-root");
    let hash = capkit::identity::project_hash(&root);
    let crew_dir = crew_root.join(&hash);

    lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();
    let outcome = lifecycle::stop(&root, &crew_dir, Some("dev"), true).unwrap();
    assert_eq!(outcome.removed_worktrees.len(), 2, "{:?}", outcome.errors);
    for path in &outcome.removed_worktrees {
        assert!(!path.exists());
    }
    assert!(WorktreeRegistry::load(&crew_dir).unwrap().worktrees.is_empty());

    // Invariant: no orphans remain after stop --cleanup
    assert!(gc::find_orphans(&crew_root, 4.0, Utc::now()).unwrap().is_empty());
}

#[test]
fn provisioned_worktrees_share_tooling_but_keep_local_state() {
    let (_tmp, root, crew_dir) = setup();
    // Shared tooling in the source project
    let agents = root.join(".capkit").join("agents");
    std::fs::create_dir_all(&agents).unwrap();
    std::fs::write(agents.join("scout.md"), "prompt").unwrap();

    lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();

    let wt = std::path::PathBuf::from(format!("{}-dev-feat--a", root.display()));
    let state_dir = wt.join(".capkit");
    assert!(state_dir.join("agents").is_symlink());
    assert!(
        state_dir.join("agents").join("scout.md").exists(),
        "symlink resolves into the source project"
    );
    assert!(state_dir.join("sessions").is_dir());
    assert!(!state_dir.join("sessions").is_symlink());

    // Teardown leaves the source project's shared state intact
    lifecycle::stop(&root, &crew_dir, Some("dev"), true).unwrap();
    assert!(agents.join("scout.md").exists());
}

#[test]
fn existing_non_worktree_directory_blocks_that_teammate_only() {
    let (_tmp, root, crew_dir) = setup();
    let blocker = std::path::PathBuf::from(format!("{}-dev-feat--a", root.display()));
    std::fs::create_dir_all(&blocker).unwrap();

    let outcome = lifecycle::start(&root, &crew_dir, Some("dev"), false).unwrap();
    assert_eq!(outcome.teammate_errors.len(), 1);
    assert_eq!(outcome.teammate_errors[0].0, "alice");
    // Bob still got his worktree
    assert!(Path::new(&format!("{}-dev-feat--b", root.display())).is_dir());
}
