//! Command-line interface.

mod check;
mod run;

use clap::{Parser, Subcommand};

use crate::app::config::Config;
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "parlay", about = "Autonomous binary prediction-market trading daemon")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the trading pipeline until interrupted.
    Run,
    /// Diagnostics that do not start the pipeline.
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },
}

#[derive(Debug, Subcommand)]
enum CheckTarget {
    /// Load and validate the configuration.
    Config,
    /// Probe the upstream catalog and trading endpoints.
    Connection,
}

impl Cli {
    /// Dispatch the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = Config::load()?;
        match self.command {
            Command::Run => run::run(config).await,
            Command::Check { target } => match target {
                CheckTarget::Config => check::config(&config),
                CheckTarget::Connection => check::connection(&config).await,
            },
        }
    }
}
