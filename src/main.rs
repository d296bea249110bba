//! prefixcache - Provider IP-range cache for MikroTik RouterOS
//!
//! Keeps the announced prefixes of network providers cached and renders
//! them as RouterOS address-list scripts.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use prefixcache::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // stdout carries the script and JSON output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let provider = cli.provider.as_deref();

    // Execute command
    match cli.command {
        Commands::Script { output, no_wait } => {
            prefixcache::commands::script::run(&cli.config, provider, output.as_deref(), no_wait)
                .await
        }
        Commands::Status => prefixcache::commands::status::run(&cli.config, provider).await,
        Commands::Reset => prefixcache::commands::reset::run(&cli.config, provider).await,
        Commands::Refresh => prefixcache::commands::refresh::run(&cli.config, provider).await,
        Commands::Config { action } => prefixcache::commands::config::run(action, &cli.config).await,
        Commands::Version => {
            println!("prefixcache {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
