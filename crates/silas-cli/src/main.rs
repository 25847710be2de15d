//! Silas - conversational agent runtime CLI.
//!
//! A thin client over the crates in this workspace: `silas init` lays out a
//! workspace directory, `silas start` wires every crate together and runs
//! the orchestrator's turn loop against a stdio channel.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod agents;
mod approval;
mod audit;
mod channel;
mod commands;
mod gates;
mod skills;

/// Silas - conversational agent runtime.
#[derive(Parser)]
#[command(name = "silas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a workspace directory (`data/`, sandbox dirs, starter config.toml)
    Init,

    /// Load a config and run the agent runtime against stdio
    Start {
        /// Path to a `config.toml`. Falls back to built-in defaults if omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Init => match commands::init::run_init() {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("init failed: {e}");
                2
            }
        },
        Commands::Start { config } => commands::start::run_start(config.as_deref()).await,
    };

    std::process::exit(exit_code);
}
