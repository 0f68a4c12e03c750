//! Role presets for teammates.
//!
//! A closed dictionary: a `role` in the crew config supplies defaults for
//! model, permission mode, subagent type and focus; explicit fields on the
//! teammate override them.

/// Defaults supplied by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePreset {
    pub model: &'static str,
    pub mode: &'static str,
    pub subagent_type: &'static str,
    pub focus_prefix: &'static str,
}

/// Known role names, in display order.
pub const KNOWN_ROLES: &[&str] = &["developer", "reviewer", "tester", "architect"];

/// Look up a role preset by name.
pub fn preset(role: &str) -> Option<RolePreset> {
    match role {
        "developer" => Some(RolePreset {
            model: "sonnet",
            mode: "bypassPermissions",
            subagent_type: "general-purpose",
            focus_prefix: "Implement features, write code, fix bugs in your worktree.",
        }),
        "reviewer" => Some(RolePreset {
            model: "sonnet",
            mode: "default",
            subagent_type: "general-purpose",
            focus_prefix: "Review code for bugs, security, quality. Read-only — do not modify files.",
        }),
        "tester" => Some(RolePreset {
            model: "haiku",
            mode: "bypassPermissions",
            subagent_type: "general-purpose",
            focus_prefix: "Write and run tests. Ensure coverage for new features.",
        }),
        "architect" => Some(RolePreset {
            model: "opus",
            mode: "default",
            subagent_type: "general-purpose",
            focus_prefix: "Design architecture, review patterns, suggest improvements. Read-only.",
        }),
        _ => None,
    }
}
