//! Project and crew identity resolution.
//!
//! Every record in the capsule store lives under `proj/<hash>/…`, where the
//! hash is derived from the origin remote URL (stable across clones) or the
//! working directory as a fallback. Inside a crew worktree, records are
//! additionally scoped to the teammate; the resolver discovers which
//! teammate is active from an ordered list of hints.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crew::registry::WorktreeRegistry;
use crate::git::Repository;
use crate::paths;

/// Identity file written at each crew worktree root.
pub const IDENTITY_FILE: &str = "crew-identity.json";

/// First 12 hex chars of a SHA-256 over the input.
pub fn sha12(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Stable per-project hash: the origin remote URL when available, else the
/// canonicalized working directory.
pub fn project_hash(cwd: &Path) -> String {
    let repo = Repository::at(cwd);
    let seed = repo
        .remote_url("origin")
        .unwrap_or_else(|| {
            cwd.canonicalize()
                .unwrap_or_else(|_| cwd.to_path_buf())
                .display()
                .to_string()
        });
    sha12(&seed)
}

/// Identity of a teammate operating inside a crew worktree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewIdentity {
    pub teammate_name: String,
    pub project_root: String,
    pub branch: String,
    pub team_name: String,
    pub profile_name: String,
    pub created_at: String,
}

impl CrewIdentity {
    /// Read an identity file from a worktree root, also checking the state
    /// directory inside it.
    pub fn read_from(worktree: &Path) -> Option<Self> {
        for candidate in [
            worktree.join(IDENTITY_FILE),
            worktree.join(paths::STATE_DIR_NAME).join(IDENTITY_FILE),
        ] {
            if let Ok(raw) = std::fs::read_to_string(&candidate)
                && let Ok(identity) = serde_json::from_str(&raw)
            {
                return Some(identity);
            }
        }
        None
    }

    /// Write the identity file at a worktree root. Always local, never a
    /// symlink target.
    pub fn write_to(&self, worktree: &Path) -> anyhow::Result<()> {
        let path = worktree.join(IDENTITY_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Resolve the active crew identity, if any.
///
/// Strategies in order, first hit wins:
/// 1. Identity file at the working directory (or its state dir).
/// 2. `$CAPKIT_WORKTREE` pointing at a worktree; identity file under it.
/// 3. Worktree registry for this project: a `file_path` hint selects the
///    entry whose path is a prefix of it; with no hint, a sole registered
///    worktree wins; anything else is ambiguous and resolves to None.
pub fn resolve_crew_identity(cwd: &Path, file_path: Option<&Path>) -> Option<CrewIdentity> {
    let crew_dir = paths::project_crew_dir(&project_hash(cwd));
    resolve_with(cwd, file_path, &crew_dir)
}

/// Strategy chain with an explicit registry directory (testable without the
/// global config root).
pub fn resolve_with(
    cwd: &Path,
    file_path: Option<&Path>,
    project_crew_dir: &Path,
) -> Option<CrewIdentity> {
    if let Some(identity) = CrewIdentity::read_from(cwd) {
        return Some(identity);
    }

    if let Ok(hint) = std::env::var(paths::WORKTREE_ENV)
        && !hint.is_empty()
        && let Some(identity) = CrewIdentity::read_from(Path::new(&hint))
    {
        return Some(identity);
    }

    let registry = WorktreeRegistry::load(project_crew_dir).ok()?;
    let entry = match file_path {
        // Teammates running from a parent directory touch absolute paths
        // inside their worktree; the file path is the only reliable hint.
        Some(fp) => registry.find_for_file(fp)?,
        None if registry.worktrees.len() == 1 => &registry.worktrees[0],
        None => return None,
    };

    // Prefer the identity file inside the registered worktree; synthesize
    // from the registry entry when the file is gone.
    CrewIdentity::read_from(&entry.path).or_else(|| {
        Some(CrewIdentity {
            teammate_name: entry.name.clone(),
            project_root: cwd.display().to_string(),
            branch: entry.branch.clone(),
            team_name: entry.profile.clone(),
            profile_name: entry.profile.clone(),
            created_at: entry.created_at.clone(),
        })
    })
}

/// Namespace scope for capsule records: the project tenant prefix plus the
/// optional crew re-scoping.
#[derive(Debug, Clone)]
pub struct Scope {
    pub project_hash: String,
    pub crew: Option<CrewIdentity>,
}

impl Scope {
    pub fn new(project_hash: String, crew: Option<CrewIdentity>) -> Self {
        Self { project_hash, crew }
    }

    /// Resolve the scope for the current invocation.
    pub fn resolve(cwd: &Path, file_path: Option<&Path>) -> Self {
        let hash = project_hash(cwd);
        let crew = resolve_crew_identity(cwd, file_path);
        Self::new(hash, crew)
    }

    /// `proj/<hash>` or `proj/<hash>/crew/<teammate>`.
    pub fn base_ns(&self) -> String {
        match &self.crew {
            Some(identity) => format!(
                "proj/{}/crew/{}",
                self.project_hash, identity.teammate_name
            ),
            None => format!("proj/{}", self.project_hash),
        }
    }

    /// Namespace root for one session's records.
    pub fn session_ns(&self, session_id: &str) -> String {
        format!("{}/session/{}", self.base_ns(), session_id)
    }

    pub fn session_files_ns(&self, session_id: &str) -> String {
        format!("{}/files", self.session_ns(session_id))
    }

    pub fn session_subagents_ns(&self, session_id: &str) -> String {
        format!("{}/subagents", self.session_ns(session_id))
    }

    pub fn session_handoff_ns(&self, session_id: &str) -> String {
        format!("{}/handoff", self.session_ns(session_id))
    }

    /// Where session summaries are written (the session namespace root).
    pub fn session_root_ns(&self) -> String {
        format!("{}/session", self.base_ns())
    }

    /// Project-wide discovery namespace (outside crew scoping).
    pub fn discoveries_ns(&self) -> String {
        format!("proj/{}/discoveries", self.project_hash)
    }

    /// Discoveries shared across the whole crew.
    pub fn shared_discoveries_ns(&self) -> String {
        format!("proj/{}/crew/_shared/discoveries", self.project_hash)
    }

    pub fn teammate_name(&self) -> Option<&str> {
        self.crew.as_ref().map(|c| c.teammate_name.as_str())
    }
}
