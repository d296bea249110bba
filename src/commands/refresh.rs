//! Refresh command implementation.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::signal;

/// Run the refresh command. Refreshes even if the cache is fresh.
pub async fn run(config_path: &Path, provider: Option<&str>) -> Result<()> {
    let cache = super::open_cache(config_path, provider)?;

    info!("Refreshing {}...", cache.provider().label);
    let outcome = match signal::until_shutdown(cache.refresh()).await {
        Some(outcome) => outcome,
        None => {
            // The in-progress flag expires on its own
            warn!("Interrupted before the refresh finished");
            std::process::exit(130);
        }
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
