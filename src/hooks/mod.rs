//! Agent-runtime hooks.
//!
//! Five short-lived handlers invoked by the host runtime around tool use
//! and session lifecycle. Every handler runs under a wrapper that catches
//! all failures and exits 0: a hook must never block the host, reject a
//! tool, or break a compaction. Diagnostics go to stderr via `log`;
//! stdout carries only the structured hook output.

use std::path::Path;

mod event;
mod post_tool_use;
mod pre_compact;
mod pre_tool_use;
mod session_end;
mod session_start;

pub use event::{HookEvent, ToolInput};

use crate::identity::Scope;
use crate::paths;
use crate::store::CapsuleStore;

/// The hook events capkit handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum HookKind {
    PreToolUse,
    PostToolUse,
    SessionStart,
    PreCompact,
    SessionEnd,
}

/// Run a hook end-to-end: read the event from stdin, dispatch, print any
/// output. Always returns exit code 0; failures are logged to stderr only.
pub fn run(kind: HookKind) -> i32 {
    if let Err(e) = run_inner(kind) {
        log::debug!("{kind} hook: {e:#}");
    }
    0
}

fn run_inner(kind: HookKind) -> anyhow::Result<()> {
    let Some(event) = HookEvent::from_stdin() else {
        return Ok(());
    };
    let cwd = event.cwd();
    if paths::hooks_disabled(&cwd) {
        return Ok(());
    }

    let file_path = event.file_path().map(Path::new);
    let scope = Scope::resolve(&cwd, file_path);

    if let Some(output) = dispatch(kind, &event, &cwd, &scope)? {
        println!("{output}");
    }
    Ok(())
}

fn dispatch(
    kind: HookKind,
    event: &HookEvent,
    cwd: &Path,
    scope: &Scope,
) -> anyhow::Result<Option<String>> {
    match kind {
        HookKind::PreToolUse => pre_tool_use::handle(event),
        HookKind::PostToolUse => {
            let store = CapsuleStore::open_default()?;
            post_tool_use::handle(&store, scope, event)
        }
        HookKind::SessionStart => {
            let store = CapsuleStore::open_default()?;
            session_start::handle(&store, scope, cwd, event)
        }
        HookKind::PreCompact => {
            let store = CapsuleStore::open_default()?;
            pre_compact::handle(&store, scope, event)
        }
        HookKind::SessionEnd => {
            let store = CapsuleStore::open_default()?;
            session_end::handle(&store, scope, cwd, event)
        }
    }
}

/// Render the session-start stdout shape around an additional-context
/// string.
pub(crate) fn session_start_output(additional_context: &str) -> String {
    serde_json::json!({
        "hookSpecificOutput": {
            "hookEventName": "SessionStart",
            "additionalContext": additional_context,
        }
    })
    .to_string()
}
