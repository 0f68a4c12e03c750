//! Repository context for git operations.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{GitError, MergeProbe, Worktree, parse_worktree_list};

/// Repository context for git operations.
///
/// Encapsulates the directory git commands run in. Worktrees are
/// repositories too: `Repository::at(worktree_path)` operates on that
/// checkout while sharing the underlying object store.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
}

impl Repository {
    /// Create a repository context at the specified path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a repository context for the current directory.
    pub fn current() -> Self {
        Self::at(".")
    }

    /// The path this repository context operates on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a git command and return trimmed stdout, failing on non-zero exit.
    pub fn run_command(&self, args: &[&str]) -> Result<String, GitError> {
        let (code, stdout, stderr) = self.run_raw(args)?;
        if code != 0 {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(GitError::CommandFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                detail
            )));
        }
        Ok(stdout.trim().to_string())
    }

    /// Run a git command, returning the exit code and stdout without
    /// treating non-zero exit as failure. Used for probes like `merge-tree`
    /// where exit code 1 carries meaning.
    pub fn run_with_status(&self, args: &[&str]) -> Result<(i32, String), GitError> {
        let (code, stdout, _stderr) = self.run_raw(args)?;
        Ok((code, stdout))
    }

    fn run_raw(&self, args: &[&str]) -> Result<(i32, String, String), GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .map_err(|e| GitError::CommandFailed(format!("failed to run git: {}", e)))?;
        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    /// Whether `git` is available and this path is inside a repository.
    pub fn is_repository(&self) -> bool {
        self.run_command(&["rev-parse", "--git-dir"]).is_ok()
    }

    /// Root of the current checkout (worktree root when inside a worktree).
    pub fn repo_root(&self) -> Result<PathBuf, GitError> {
        let stdout = self.run_command(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(stdout))
    }

    /// The current branch name, or None in detached HEAD state.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let stdout = self.run_command(&["branch", "--show-current"])?;
        let branch = stdout.trim();
        if branch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(branch.to_string()))
        }
    }

    /// URL of the named remote, or None if it isn't configured.
    pub fn remote_url(&self, remote: &str) -> Option<String> {
        self.run_command(&["remote", "get-url", remote])
            .ok()
            .filter(|url| !url.is_empty())
    }

    /// Check if a branch exists locally.
    pub fn branch_exists_local(&self, branch: &str) -> bool {
        self.run_command(&["rev-parse", "--verify", &format!("refs/heads/{}", branch)])
            .is_ok()
    }

    /// Check if a branch exists on the given remote.
    pub fn branch_exists_remote(&self, remote: &str, branch: &str) -> bool {
        self.run_command(&[
            "rev-parse",
            "--verify",
            &format!("refs/remotes/{}/{}", remote, branch),
        ])
        .is_ok()
    }

    /// Detect the main branch.
    ///
    /// Strategy: `symbolic-ref` of `origin/HEAD`, then a local `main`,
    /// then `master`, then `"main"` as the final fallback.
    pub fn detect_main_branch(&self) -> String {
        if let Ok(head) = self.run_command(&["symbolic-ref", "refs/remotes/origin/HEAD"])
            && let Some(branch) = head.strip_prefix("refs/remotes/origin/")
        {
            return branch.to_string();
        }
        for candidate in ["main", "master"] {
            if self.branch_exists_local(candidate) {
                return candidate.to_string();
            }
        }
        "main".to_string()
    }

    /// Count commits reachable from `upstream` but not from `branch`
    /// (how far `branch` is behind `upstream`).
    pub fn behind_count(&self, branch: &str, upstream: &str) -> Result<usize, GitError> {
        let range = format!("{}..{}", branch, upstream);
        let stdout = self.run_command(&["rev-list", "--count", &range])?;
        stdout
            .parse()
            .map_err(|_| GitError::ParseError(format!("bad rev-list count: {}", stdout)))
    }

    /// Commits on HEAD within the last `hours` hours.
    pub fn recent_commit_count(&self, hours: u64) -> Result<usize, GitError> {
        let since = format!("{} hours ago", hours);
        let stdout = self.run_command(&["rev-list", "--count", "--since", &since, "HEAD"])?;
        stdout
            .parse()
            .map_err(|_| GitError::ParseError(format!("bad rev-list count: {}", stdout)))
    }

    /// Resolve a ref to its commit id.
    pub fn rev_parse(&self, reference: &str) -> Result<String, GitError> {
        self.run_command(&["rev-parse", reference])
    }

    // ========== Worktrees ==========

    /// List all worktrees, bare entries filtered out.
    pub fn list_worktrees(&self) -> Result<Vec<Worktree>, GitError> {
        let stdout = self.run_command(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&stdout)
            .into_iter()
            .filter(|wt| !wt.bare)
            .collect())
    }

    /// Whether the given path is a registered worktree of this repository.
    pub fn is_registered_worktree(&self, path: &Path) -> Result<bool, GitError> {
        let worktrees = self.list_worktrees()?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Ok(worktrees.iter().any(|wt| {
            wt.path == path
                || wt
                    .path
                    .canonicalize()
                    .map(|p| p == canonical)
                    .unwrap_or(false)
        }))
    }

    /// Add a worktree checking out an existing local branch.
    pub fn add_worktree(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        let path_str = path_str(path)?;
        self.run_command(&["worktree", "add", path_str, branch])
            .map_err(|e| GitError::WorktreeCreationFailed {
                branch: branch.to_string(),
                base_branch: None,
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Add a worktree on a new tracking branch for `remote/branch`.
    pub fn add_worktree_tracking(
        &self,
        path: &Path,
        branch: &str,
        remote: &str,
    ) -> Result<(), GitError> {
        let path_str = path_str(path)?;
        let remote_ref = format!("{}/{}", remote, branch);
        self.run_command(&["worktree", "add", "--track", "-b", branch, path_str, &remote_ref])
            .map_err(|e| GitError::WorktreeCreationFailed {
                branch: branch.to_string(),
                base_branch: Some(remote_ref.clone()),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Add a worktree on a new branch created from `base`.
    pub fn add_worktree_new_branch(
        &self,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), GitError> {
        let path_str = path_str(path)?;
        self.run_command(&["worktree", "add", "-b", branch, path_str, base])
            .map_err(|e| GitError::WorktreeCreationFailed {
                branch: branch.to_string(),
                base_branch: Some(base.to_string()),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Remove a worktree, forcing removal of untracked files.
    pub fn remove_worktree(&self, path: &Path) -> Result<(), GitError> {
        let path_str = path_str(path)?;
        self.run_command(&["worktree", "remove", "--force", path_str])
            .map_err(|e| GitError::WorktreeRemovalFailed {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Prune worktree entries whose directories no longer exist.
    pub fn prune_worktrees(&self) -> Result<(), GitError> {
        self.run_command(&["worktree", "prune"])?;
        Ok(())
    }

    /// Delete a local branch (`-D`).
    pub fn delete_branch(&self, branch: &str) -> Result<(), GitError> {
        self.run_command(&["branch", "-D", branch])?;
        Ok(())
    }

    // ========== Diffs and merges ==========

    /// Files changed on `branch` relative to the merge base with `main`
    /// (the three-dot range).
    pub fn changed_files(&self, main: &str, branch: &str) -> Result<Vec<String>, GitError> {
        let range = format!("{}...{}", main, branch);
        let stdout = self.run_command(&["diff", "--name-only", &range])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Probe whether merging `branch` into `main` would conflict, without
    /// touching the working tree.
    ///
    /// Prefers `merge-tree --write-tree` (exit code 1 signals conflicts and
    /// `--name-only` lists the files). Falls back to the older
    /// ancestor-based `merge-tree` form when the modern one is unavailable.
    pub fn merge_probe(&self, main: &str, branch: &str) -> Result<MergeProbe, GitError> {
        match self.run_with_status(&["merge-tree", "--write-tree", "--name-only", main, branch]) {
            Ok((0, _)) => Ok(MergeProbe::default()),
            Ok((1, out)) => Ok(MergeProbe {
                conflicts: true,
                conflict_files: parse_write_tree_conflicts(&out),
            }),
            _ => self.merge_probe_ancestor(main, branch),
        }
    }

    /// Older merge-tree form: `merge-tree <base> <main> <branch>`, scanning
    /// the textual output for conflict blocks.
    fn merge_probe_ancestor(&self, main: &str, branch: &str) -> Result<MergeProbe, GitError> {
        let base = self.run_command(&["merge-base", main, branch])?;
        let out = self.run_command(&["merge-tree", &base, main, branch])?;
        let conflicts = out.contains("<<<<<<<") || out.contains("changed in both");
        Ok(MergeProbe {
            conflicts,
            conflict_files: parse_ancestor_conflicts(&out),
        })
    }

    /// Check out a branch in this repository's working tree.
    pub fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run_command(&["checkout", branch])?;
        Ok(())
    }

    /// Merge a branch into the current checkout without opening an editor.
    pub fn merge_no_edit(&self, branch: &str) -> Result<(), GitError> {
        self.run_command(&["merge", "--no-edit", branch])
            .map_err(|e| GitError::MergeFailed {
                branch: branch.to_string(),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Abort an in-progress merge.
    pub fn merge_abort(&self) -> Result<(), GitError> {
        self.run_command(&["merge", "--abort"])?;
        Ok(())
    }

    /// Hard-reset the current checkout to a commit.
    pub fn reset_hard(&self, reference: &str) -> Result<(), GitError> {
        self.run_command(&["reset", "--hard", reference])?;
        Ok(())
    }

    /// Create a lightweight tag at HEAD.
    pub fn create_tag(&self, name: &str) -> Result<(), GitError> {
        self.run_command(&["tag", name])?;
        Ok(())
    }
}

fn path_str(path: &Path) -> Result<&str, GitError> {
    path.to_str().ok_or_else(|| {
        GitError::ParseError(format!("path contains invalid UTF-8: {}", path.display()))
    })
}

/// Extract conflicted filenames from `merge-tree --write-tree --name-only`
/// output: the first line is the tree oid, the following lines up to the
/// first blank line name the conflicted files.
fn parse_write_tree_conflicts(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .collect()
}

/// Extract filenames from the older merge-tree form: under a
/// `changed in both` header, the `our` line carries the path as its last
/// field.
fn parse_ancestor_conflicts(output: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut in_block = false;
    for line in output.lines() {
        if line == "changed in both" {
            in_block = true;
            continue;
        }
        if in_block && line.trim_start().starts_with("our ") {
            if let Some(path) = line.split_whitespace().last() {
                files.push(path.to_string());
            }
            in_block = false;
        } else if !line.starts_with(' ') {
            in_block = false;
        }
    }
    files.sort();
    files.dedup();
    files
}
