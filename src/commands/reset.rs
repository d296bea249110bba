//! Reset command implementation.

use anyhow::Result;
use std::path::Path;
use tracing::info;

/// Run the reset command
pub async fn run(config_path: &Path, provider: Option<&str>) -> Result<()> {
    let cache = super::open_cache(config_path, provider)?;

    info!("Resetting cache for {}...", cache.name());
    let outcome = cache.reset().await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
