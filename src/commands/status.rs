//! Status command implementation.

use anyhow::Result;
use std::path::Path;

/// Run the status command. Prints JSON and never triggers a refresh.
pub async fn run(config_path: &Path, provider: Option<&str>) -> Result<()> {
    let cache = super::open_cache(config_path, provider)?;
    let status = cache.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
