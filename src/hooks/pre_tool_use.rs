//! Pre-tool-use hook: advisory only.
//!
//! May suggest the AST chunker before the host reads a very large file.
//! Never rejects or rewrites tool input; user-visible semantics stay
//! untouched.

use std::path::Path;

use anyhow::Result;

use super::HookEvent;

/// Files larger than this are worth chunking instead of reading whole.
const LARGE_FILE_BYTES: u64 = 256 * 1024;

const READING_TOOLS: &[&str] = &["Read", "Grep", "Glob"];

pub(crate) fn handle(event: &HookEvent) -> Result<Option<String>> {
    let Some(tool_name) = event.tool_name.as_deref() else {
        return Ok(None);
    };
    if !READING_TOOLS.contains(&tool_name) {
        return Ok(None);
    }
    let Some(file_path) = event.file_path() else {
        return Ok(None);
    };

    let Ok(metadata) = std::fs::metadata(Path::new(file_path)) else {
        return Ok(None);
    };
    if !metadata.is_file() || metadata.len() <= LARGE_FILE_BYTES {
        return Ok(None);
    }

    Ok(Some(format!(
        "Note: {} is {} KB; consider the AST chunker for a structured view instead of reading it whole.",
        file_path,
        metadata.len() / 1024
    )))
}
