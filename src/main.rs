mod cli;
mod config;
mod deploy;
mod error;
mod gcloud;
mod output;
mod platform;
mod reconcile;
mod release;
mod secrets;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .without_time()
        .init();

    let command = cli.command.unwrap_or(Command::Deploy {
        non_interactive: false,
    });
    let load = || -> Result<config::DeployConfig> {
        config::DeployConfig::load(&cli.config)?
            .with_overrides(cli.project.clone(), cli.region.clone())
    };

    match command {
        Command::Init => {
            cli::init::run(&cli.config)?;
        }

        Command::Deploy { non_interactive } => {
            cli::deploy::run(load()?, non_interactive).await?;
        }

        Command::Plan => {
            cli::plan::run(load()?).await?;
        }

        Command::Status { reveal } => {
            cli::status::run(load()?, reveal).await?;
        }
    }

    Ok(())
}
