//! Argument parsing for the example binary. Only covers what this
//! crate actually wires up — a single-turn `run` command and a
//! `doctor` configuration check — not the HTTP transport this pipeline
//! would sit behind in a full deployment.

use clap::{Parser, Subcommand};

/// A thin command-line front end for one turn of the conversational
/// core.
#[derive(Debug, Parser)]
#[command(name = "ca-cli", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Send a single message through one turn and print the response.
    Run {
        /// The message to send.
        message: String,
        /// Session key to run the turn against (created if new).
        #[arg(long, default_value = "cli:run")]
        session: String,
        /// Room key from config to run this turn in (manual/tag/roundtable/
        /// orchestrator). Omit to talk to a single ad hoc agent directly.
        #[arg(long)]
        room: Option<String>,
        /// Model alias override for the ad hoc agent used when `--room`
        /// is omitted.
        #[arg(long)]
        model: Option<String>,
        /// Print the full turn result as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Print version information.
    Version,
}
