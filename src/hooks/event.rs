//! Hook event payloads.
//!
//! The host agent runtime pipes a JSON event into each hook's stdin. Only
//! the fields capkit consumes are modeled; everything else is ignored so
//! runtime payload changes never break the hooks.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub subagent_type: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: ToolInput,
    #[serde(default)]
    pub tool_result: Option<serde_json::Value>,
}

impl HookEvent {
    /// Parse an event from a JSON string. Returns None when the input is
    /// empty or not valid JSON.
    pub fn parse(input: &str) -> Option<Self> {
        if input.trim().is_empty() {
            return None;
        }
        serde_json::from_str(input).ok()
    }

    /// Read and parse the event from stdin. Returns None when stdin is a
    /// terminal (interactive invocation) or the payload doesn't parse.
    pub fn from_stdin() -> Option<Self> {
        if io::stdin().is_terminal() {
            return None;
        }
        let mut input = String::new();
        io::stdin().read_to_string(&mut input).ok()?;
        Self::parse(&input)
    }

    /// The file path hint, from either `tool_input.file_path` or
    /// `tool_input.path`.
    pub fn file_path(&self) -> Option<&str> {
        self.tool_input
            .file_path
            .as_deref()
            .or(self.tool_input.path.as_deref())
    }

    /// Working directory for this event: the payload's `cwd`, else the
    /// process working directory.
    pub fn cwd(&self) -> PathBuf {
        self.cwd
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Best-effort plain text of the tool result: a string value directly,
    /// or common text-carrying fields of an object.
    pub fn tool_result_text(&self) -> Option<String> {
        let value = self.tool_result.as_ref()?;
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => ["content", "text", "output", "result"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
                .map(String::from),
            _ => None,
        }
    }
}
