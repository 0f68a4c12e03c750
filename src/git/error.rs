//! Git error types and formatting.

use std::path::PathBuf;

#[derive(Debug)]
pub enum GitError {
    /// Raw git command failure; message is already formatted for display
    CommandFailed(String),
    /// Output of a git command could not be parsed
    ParseError(String),
    /// Path is not inside a git repository
    NotARepository { path: PathBuf },
    /// Destination directory exists but is not a registered worktree
    NotAWorktree { path: PathBuf },
    /// Creating a worktree failed
    WorktreeCreationFailed {
        branch: String,
        base_branch: Option<String>,
        error: String,
    },
    /// Removing a worktree failed
    WorktreeRemovalFailed { path: PathBuf, error: String },
    /// Branch does not exist locally or on the remote
    BranchMissing { branch: String },
    /// A merge could not be completed
    MergeFailed { branch: String, error: String },
}

impl GitError {
    /// Create a formatted user-facing error message.
    ///
    /// Use this for application errors (not raw git output).
    pub fn message(msg: impl Into<String>) -> Self {
        GitError::CommandFailed(crate::styling::format_error(&msg.into()))
    }
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::styling::{format_error, format_error_with_bold, format_hint};

        match self {
            // Raw passthrough; already formatted at the point of failure
            GitError::CommandFailed(msg) => write!(f, "{}", msg),

            GitError::ParseError(msg) => write!(f, "{}", format_error(msg)),

            GitError::NotARepository { path } => {
                write!(
                    f,
                    "{}",
                    format_error_with_bold("Not a git repository: '", &path.display().to_string(), "'")
                )
            }

            GitError::NotAWorktree { path } => {
                write!(
                    f,
                    "{}\n{}",
                    format_error_with_bold(
                        "Directory exists but is not a registered worktree: '",
                        &path.display().to_string(),
                        "'"
                    ),
                    format_hint("Remove the directory or run 'git worktree prune' and retry")
                )
            }

            GitError::WorktreeCreationFailed {
                branch,
                base_branch,
                error,
            } => {
                let base = base_branch
                    .as_ref()
                    .map(|b| format!(" from '{}'", b))
                    .unwrap_or_default();
                write!(
                    f,
                    "{}\n{}",
                    format_error_with_bold("Failed to create worktree for '", branch, &format!("'{base}")),
                    error.trim()
                )
            }

            GitError::WorktreeRemovalFailed { path, error } => {
                write!(
                    f,
                    "{}\n{}",
                    format_error_with_bold(
                        "Failed to remove worktree at '",
                        &path.display().to_string(),
                        "'"
                    ),
                    error.trim()
                )
            }

            GitError::BranchMissing { branch } => {
                write!(
                    f,
                    "{}",
                    format_error_with_bold("Branch '", branch, "' does not exist")
                )
            }

            GitError::MergeFailed { branch, error } => {
                write!(
                    f,
                    "{}\n{}",
                    format_error_with_bold("Merge of '", branch, "' failed"),
                    error.trim()
                )
            }
        }
    }
}

impl std::error::Error for GitError {}

impl From<std::io::Error> for GitError {
    fn from(e: std::io::Error) -> Self {
        GitError::CommandFailed(e.to_string())
    }
}
