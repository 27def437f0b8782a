//! trackref CLI: the `trackref` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing(cli.log.as_deref());

    match cli.command {
        Commands::Resolve {
            issues,
            snapshot,
            config,
            offline,
            missing,
            children,
            json,
        } => commands::resolve::run(commands::resolve::Args {
            issues,
            snapshot,
            config,
            offline,
            missing,
            children,
            json,
        }),

        Commands::Categories { json } => commands::categories::run(json),
    }
}
