use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod deploy;
pub mod init;
pub mod plan;
pub mod status;

#[derive(Parser)]
#[command(
    name = "thermo-deploy",
    version,
    about = "Release the site to Cloud Run: provision, migrate, deploy"
)]
pub struct Cli {
    /// Path to deploy.toml (optional; defaults apply when missing)
    #[arg(short, long, default_value = "deploy.toml", global = true)]
    pub config: PathBuf,

    /// Google Cloud project
    #[arg(long, env = "GCP_PROJECT_ID", global = true)]
    pub project: Option<String>,

    /// Cloud Run region
    #[arg(long, env = "GCP_REGION", global = true)]
    pub region: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Runs `deploy` when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build, migrate and release (first deploy provisions everything)
    Deploy {
        /// Fail instead of prompting for missing secrets
        #[arg(long)]
        non_interactive: bool,
    },

    /// Show what a deploy would do without changing anything
    Plan,

    /// Show the live service and migration job
    Status {
        /// Show environment values instead of masking them
        #[arg(long)]
        reveal: bool,
    },

    /// Scaffold deploy.toml in the current directory
    Init,
}
