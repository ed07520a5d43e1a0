use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ota",
    about = "OTA update store: resolve update checks and inspect storage setup",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve an update check against a package history file
    Resolve(ResolveArgs),
    /// Show or validate storage configuration
    Config(ConfigArgs),
    /// Provision in-memory storage and run its health check
    Health(HealthArgs),
}

#[derive(Args)]
pub struct ResolveArgs {
    /// JSON array of packages, oldest first
    pub history: PathBuf,
    #[arg(long)]
    pub app_version: String,
    #[arg(long)]
    pub package_hash: Option<String>,
    #[arg(long)]
    pub label: Option<String>,
    #[arg(long)]
    pub companion: bool,
    /// Client id used for staged rollouts
    #[arg(long)]
    pub client_id: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Check a configuration file
    Validate { file: PathBuf },
}

#[derive(Args)]
pub struct HealthArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}
