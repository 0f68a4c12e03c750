//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use capkit::HookKind;

#[derive(Parser)]
#[command(
    name = "cap",
    version,
    about = "Durable context capture and crew orchestration for AI coding sessions",
    propagate_version = true
)]
pub struct Cli {
    /// Override the global config directory (default: ~/.config/capkit)
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a crew config template into the project root
    Init,

    /// Provision worktrees and launch (or resume) a crew profile
    Start {
        /// Profile to start (default: the config's default profile)
        profile: Option<String>,
        /// Force a fresh launch even when the team is resumable
        #[arg(long)]
        fresh: bool,
    },

    /// Stop a crew profile
    Stop {
        profile: Option<String>,
        /// Also remove the profile's worktrees
        #[arg(long)]
        cleanup: bool,
    },

    /// Show team state (all profiles when none is given)
    Status { profile: Option<String> },

    /// Classify teammate health and print recommendations
    Doctor { profile: Option<String> },

    /// Preview per-branch merges against the main branch
    MergePreview { profile: Option<String> },

    /// Merge teammate branches into the main branch
    Merge {
        profile: Option<String>,
        /// Run a test command after each merge; roll the merge back when
        /// it fails
        #[arg(
            long,
            value_name = "CMD",
            num_args = 0..=1,
            require_equals = true,
            default_missing_value = "npm test"
        )]
        test: Option<String>,
        /// Skip the backup tag on the main branch
        #[arg(long)]
        no_backup: bool,
    },

    /// Remove orphaned crew worktrees
    Gc {
        /// Also delete the orphans' branches
        #[arg(long)]
        delete_branches: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
        /// List orphans without removing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete context records older than N days (default 30)
    Prune {
        days: Option<i64>,
        /// Count matching records without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve a namespace: follow aliases, expand collections
    Resolve { namespace: String },

    /// Keyword search over record titles and summaries
    Search {
        term: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Aggregated views over the capsule store
    Stats {
        /// One of: summary, types, namespaces, files, agents, sessions, branches
        view: String,
        arg: Option<String>,
    },

    /// Run an agent-runtime hook (reads the event JSON from stdin)
    Hook {
        #[arg(value_enum)]
        event: HookKind,
    },
}
