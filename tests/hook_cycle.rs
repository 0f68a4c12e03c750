//! End-to-end hook cycles through the `cap` binary: capture, handoff
//! injection, branch-aware resume.

mod common;

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use capkit::store::CapsuleStore;
use common::{git, init_repo};
use tempfile::TempDir;

fn run_hook(config_dir: &Path, event: &str, json: &str) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_cap"))
        .args(["--config-dir", config_dir.to_str().unwrap(), "hook", event])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn cap hook");
    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(json.as_bytes())
        .unwrap();
    child.wait_with_output().expect("hook completes")
}

fn event(session: &str, cwd: &Path, rest: &str) -> String {
    let comma = if rest.is_empty() { "" } else { "," };
    format!(
        r#"{{"session_id":"{session}","cwd":"{}"{comma}{rest}}}"#,
        cwd.display()
    )
}

#[test]
fn solo_capture_cycle_records_files_agents_and_summary() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let project = tmp.path().join("p");
    std::fs::create_dir_all(&project).unwrap();

    for payload in [
        event("S1", &project, r#""tool_name":"Read","tool_input":{"file_path":"/p/src/a.ts"}"#),
        event("S1", &project, r#""tool_name":"Edit","tool_input":{"file_path":"/p/src/a.ts"}"#),
        event("S1", &project, r#""tool_name":"Edit","tool_input":{"file_path":"/p/src/b.ts"}"#),
        event(
            "S1",
            &project,
            r#""tool_name":"Task","tool_input":{"subagent_type":"error-detective","prompt":"why NPE?"}"#,
        ),
    ] {
        let out = run_hook(&config_dir, "post-tool-use", &payload);
        assert_eq!(out.status.code(), Some(0));
    }
    let out = run_hook(&config_dir, "session-end", &event("S1", &project, ""));
    assert_eq!(out.status.code(), Some(0));

    let store = CapsuleStore::open(&config_dir.join("capsule.db")).unwrap();
    let hash = capkit::identity::project_hash(&project);

    let files = store
        .list(&format!("proj/{hash}/session/s1/files"), 10)
        .unwrap();
    assert_eq!(files.len(), 2, "read+edit of a.ts upsert one record; b.ts adds one");
    let a = files.iter().find(|r| r.title == "a.ts").unwrap();
    assert!(a.summary.starts_with("edit: "), "latest action wins the upsert");
    assert!(files.iter().any(|r| r.title == "b.ts"));

    let agents = store
        .list(&format!("proj/{hash}/session/s1/subagents"), 10)
        .unwrap();
    assert_eq!(agents.len(), 1);
    assert!(agents[0].title.starts_with("error-detective - "));

    let summary = store
        .get(&format!("proj/{hash}/session"), "S1")
        .unwrap()
        .expect("session summary record");
    assert_eq!(summary.content["files"], 2);
    assert_eq!(summary.content["subagents"], 1);
}

#[test]
fn handoff_wins_over_last_session_in_next_start() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let project = tmp.path().join("p");
    std::fs::create_dir_all(&project).unwrap();

    run_hook(
        &config_dir,
        "post-tool-use",
        &event("S1", &project, r#""tool_name":"Edit","tool_input":{"file_path":"/p/src/a.ts"}"#),
    );
    run_hook(&config_dir, "session-end", &event("S1", &project, ""));
    run_hook(&config_dir, "pre-compact", &event("S1", &project, ""));

    let out = run_hook(&config_dir, "session-start", &event("S2", &project, ""));
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let value: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("session-start emits JSON");
    let context = value["hookSpecificOutput"]["additionalContext"]
        .as_str()
        .unwrap();
    assert!(context.contains("## Session Handoff"));
    assert!(!context.contains("## Last Session"));
}

#[test]
fn branch_aware_resume_prefers_matching_branch() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let project = tmp.path().join("repo");
    std::fs::create_dir_all(&project).unwrap();
    init_repo(&project);

    // Session A ends on feat/x
    git(&project, &["checkout", "-b", "feat/x"]);
    run_hook(
        &config_dir,
        "post-tool-use",
        &event("SA", &project, r#""tool_name":"Edit","tool_input":{"file_path":"/r/x.ts"}"#),
    );
    run_hook(&config_dir, "session-end", &event("SA", &project, ""));

    // Session B ends later on main
    git(&project, &["checkout", "main"]);
    run_hook(&config_dir, "session-end", &event("SB", &project, ""));

    // Back on feat/x, a new session should inject SA, not the newer SB
    git(&project, &["checkout", "feat/x"]);
    let out = run_hook(&config_dir, "session-start", &event("SC", &project, ""));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let value: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    let context = value["hookSpecificOutput"]["additionalContext"]
        .as_str()
        .unwrap();
    assert!(
        context.contains("## Branch Context (feat/x)"),
        "expected branch context, got:\n{context}"
    );
    assert!(context.contains("Session SA"));
}

#[test]
fn hooks_exit_zero_on_garbage_input() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    for event_name in ["pre-tool-use", "post-tool-use", "session-start", "pre-compact", "session-end"] {
        let out = run_hook(&config_dir, event_name, "not json at all");
        assert_eq!(out.status.code(), Some(0), "{event_name} must exit 0");
        assert!(out.stdout.is_empty(), "{event_name} must emit nothing");
    }
}

#[test]
fn session_start_with_empty_store_emits_nothing() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let project = tmp.path().join("p");
    std::fs::create_dir_all(&project).unwrap();

    let out = run_hook(&config_dir, "session-start", &event("S1", &project, ""));
    assert_eq!(out.status.code(), Some(0));
    assert!(out.stdout.is_empty());
}

#[test]
fn disable_marker_short_circuits_capture() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    let project = tmp.path().join("p");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(project.join(".capkit-off"), "").unwrap();

    let out = run_hook(
        &config_dir,
        "post-tool-use",
        &event("S1", &project, r#""tool_name":"Edit","tool_input":{"file_path":"/p/a.ts"}"#),
    );
    assert_eq!(out.status.code(), Some(0));
    assert!(
        !config_dir.join("capsule.db").exists(),
        "disabled hooks must not create the store"
    );
}
