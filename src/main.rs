use std::process;

use anstream::eprintln;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Some(dir) = cli.config_dir.clone() {
        capkit::paths::set_config_root(dir);
    }

    let code = match cli.command {
        // Hooks bypass the error path entirely: they must exit 0 no matter
        // what happened inside
        Commands::Hook { event } => capkit::hooks::run(event),
        command => match commands::run(command) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{}", capkit::styling::format_error(&format!("{e:#}")));
                1
            }
        },
    };
    process::exit(code);
}
