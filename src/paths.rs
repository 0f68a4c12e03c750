//! Filesystem locations for capkit state.
//!
//! Everything capkit persists lives in two places:
//!
//! - The **global config area** (`~/.config/capkit` or platform equivalent):
//!   the capsule record store and the per-project crew state
//!   (`crew/<project_hash>/…`).
//! - The **per-worktree state directory** (`.capkit/` inside a project or
//!   worktree): session-local files, plus symlinks into the source project's
//!   shared tooling when inside a crew worktree.
//!
//! Tests (and the `--config-dir` flag) can point the global area elsewhere
//! via [`set_config_root`].

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the per-project/worktree state directory.
pub const STATE_DIR_NAME: &str = ".capkit";

/// Marker file that disables all hook side effects when found in the
/// working directory or any ancestor.
pub const DISABLE_MARKER: &str = ".capkit-off";

/// Canonical capsule store filename.
pub const STORE_FILE: &str = "capsule.db";

/// Legacy store filename, honored when present next to the config root.
pub const LEGACY_STORE_FILE: &str = "context.db";

/// Environment variable pointing at a crew worktree, used by the identity
/// resolver when hooks run outside the worktree itself.
pub const WORKTREE_ENV: &str = "CAPKIT_WORKTREE";

/// Override for the global config root, set via --config-dir or from tests.
static CONFIG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Set the global config root override. First call wins; later calls are
/// ignored.
pub fn set_config_root(path: PathBuf) {
    CONFIG_ROOT.set(path).ok();
}

/// The global config area, `~/.config/capkit` unless overridden.
pub fn config_root() -> PathBuf {
    if let Some(p) = CONFIG_ROOT.get() {
        return p.clone();
    }
    dirs::config_dir()
        .unwrap_or_else(|| home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"))
        .join("capkit")
}

/// Path of the capsule store database.
///
/// Resolution order: the canonical `capsule.db` if present, then the legacy
/// `context.db`, then the canonical path (which callers create on demand).
pub fn capsule_db_path() -> PathBuf {
    let root = config_root();
    let canonical = root.join(STORE_FILE);
    if canonical.exists() {
        return canonical;
    }
    let legacy = root.join(LEGACY_STORE_FILE);
    if legacy.exists() {
        return legacy;
    }
    canonical
}

/// Root of the global crew state area (`<config>/crew`).
pub fn crew_root() -> PathBuf {
    config_root().join("crew")
}

/// Per-project crew state directory (`<config>/crew/<project_hash>`).
pub fn project_crew_dir(project_hash: &str) -> PathBuf {
    crew_root().join(project_hash)
}

/// Whether hook side effects are disabled for this directory.
///
/// Walks from `cwd` to the filesystem root looking for the marker file.
pub fn hooks_disabled(cwd: &Path) -> bool {
    cwd.ancestors().any(|dir| dir.join(DISABLE_MARKER).exists())
}

/// Get the user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    home::home_dir()
}

/// Format a filesystem path for user-facing output.
///
/// Replaces the home directory prefix with `~`. Paths outside home are
/// returned unchanged.
pub fn format_path_for_display(path: &Path) -> String {
    if let Some(home) = home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        if stripped.as_os_str().is_empty() {
            return "~".to_string();
        }
        let mut display_path = PathBuf::from("~");
        display_path.push(stripped);
        return display_path.display().to_string();
    }
    path.display().to_string()
}

/// Shorten a path for table cells: `~`-relative, and elided to the last two
/// components when still long.
pub fn short_path(path: &Path) -> String {
    let display = format_path_for_display(path);
    if display.len() <= 40 {
        return display;
    }
    let components: Vec<_> = Path::new(&display)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if components.len() <= 2 {
        return display;
    }
    format!("…/{}", components[components.len() - 2..].join("/"))
}
