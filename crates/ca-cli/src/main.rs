//! `ca-cli` — a minimal command-line front end for the turn-execution
//! pipeline, exercising the same crates an HTTP gateway would: loads a
//! [`ca_domain::config::Config`], runs one turn through
//! [`ca_runtime::TurnCoordinator`], and prints the result. Not a product
//! surface — it exists to give the pipeline a runnable entry point
//! outside of `cargo test`.

mod backends;
mod cli;
mod config;
mod doctor;
mod run;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
        Some(Command::Doctor) => {
            let (config, config_path) = config::load_config()?;
            let passed = doctor::run(&config, &config_path);
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Run { message, session, room, model, json }) => {
            init_tracing();
            let (config, _config_path) = config::load_config()?;
            run::run(config, message, session, room, model, json).await
        }
        Some(Command::Version) => {
            println!("ca-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing, same shape as the gateway's own
/// `init_tracing` — only turned on for `run`, since `doctor`'s output is
/// meant to be read directly, not piped through a log processor.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ca_runtime=debug")))
        .json()
        .init();
}
