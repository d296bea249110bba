//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "prefixcache")]
#[command(author, version, about = "Provider IP-range cache for MikroTik RouterOS")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Provider id (default: first configured provider)
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the RouterOS address-list script
    Script {
        /// Write the script to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit right away instead of waiting for a background refresh
        #[arg(long)]
        no_wait: bool,
    },

    /// Show cache state and metrics as JSON
    Status,

    /// Clear cached ranges (metrics are kept)
    Reset,

    /// Refresh cached ranges now
    Refresh,

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration to the config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
