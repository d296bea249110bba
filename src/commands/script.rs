//! Script command implementation.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

use crate::signal;

/// Run the script command
pub async fn run(
    config_path: &Path,
    provider: Option<&str>,
    output: Option<&Path>,
    no_wait: bool,
) -> Result<()> {
    let cache = super::open_cache(config_path, provider)?;

    let script = match cache.script().await {
        Ok(script) => script,
        Err(e) => {
            error!("Failed to generate script for {}: {}", cache.name(), e);
            eprintln!("{}", serde_json::to_string_pretty(&e.to_response())?);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            write_atomic(path, &script)?;
            info!("Wrote RouterOS script to {:?}", path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(script.as_bytes())?;
            stdout.flush()?;
        }
    }

    if no_wait || cache.pending_background().await == 0 {
        return Ok(());
    }

    info!("Waiting for background refresh to finish...");
    let limit = super::background_wait_limit(&cache);
    if signal::until_shutdown(cache.wait_for_background(limit))
        .await
        .is_none()
    {
        warn!("Interrupted, background refresh abandoned");
    }

    Ok(())
}

/// Write a file via tempfile + rename so readers never see a partial script
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    use tempfile::NamedTempFile;

    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", parent_dir))?;

    temp_file.write_all(content.as_bytes())?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to write script to {:?}", path))?;

    Ok(())
}
