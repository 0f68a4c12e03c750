//! Command handlers behind the `cap` CLI.

mod capsule;
mod crew;
mod gc;
mod merge;

use std::path::PathBuf;

use anstream::eprintln;
use anyhow::Result;

use crate::cli::Commands;
use capkit::git::Repository;

/// Dispatch a parsed command; the returned code becomes the process exit
/// code.
///
/// Read-only commands always exit 0: they report problems as warnings and
/// print whatever data they could gather.
pub fn run(command: Commands) -> Result<i32> {
    let read_only = matches!(
        command,
        Commands::Status { .. }
            | Commands::Doctor { .. }
            | Commands::MergePreview { .. }
            | Commands::Stats { .. }
            | Commands::Search { .. }
            | Commands::Resolve { .. }
    );
    match dispatch(command) {
        Err(e) if read_only => {
            eprintln!("{}", capkit::styling::format_warning(&format!("{e:#}")));
            Ok(0)
        }
        other => other,
    }
}

fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Init => crew::init(),
        Commands::Start { profile, fresh } => crew::start(profile.as_deref(), fresh),
        Commands::Stop { profile, cleanup } => crew::stop(profile.as_deref(), cleanup),
        Commands::Status { profile } => crew::status(profile.as_deref()),
        Commands::Doctor { profile } => crew::doctor(profile.as_deref()),
        Commands::MergePreview { profile } => merge::preview(profile.as_deref()),
        Commands::Merge {
            profile,
            test,
            no_backup,
        } => merge::execute(profile.as_deref(), test, no_backup),
        Commands::Gc {
            delete_branches,
            force,
            dry_run,
        } => gc::run(delete_branches, force, dry_run),
        Commands::Prune { days, dry_run } => capsule::prune(days, dry_run),
        Commands::Search { term, limit } => capsule::search(&term, limit),
        Commands::Resolve { namespace } => capsule::resolve(&namespace),
        Commands::Stats { view, arg } => capsule::stats(&view, arg.as_deref()),
        Commands::Hook { .. } => unreachable!("hooks are dispatched in main"),
    }
}

/// The project root: the repository root when inside one, else the working
/// directory.
pub(crate) fn project_root() -> PathBuf {
    Repository::current()
        .repo_root()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// The crew state directory for the current project.
pub(crate) fn project_crew_dir(project_root: &std::path::Path) -> PathBuf {
    capkit::paths::project_crew_dir(&capkit::identity::project_hash(project_root))
}
