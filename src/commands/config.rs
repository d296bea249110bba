//! Config command implementation.

use anyhow::Result;
use std::path::Path;

use crate::cli::ConfigAction;
use crate::config::Config;

/// Run the config command
pub async fn run(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(config_path)?;
            print!("{}", config.to_yaml()?);
        }
        ConfigAction::Init { force } => init(config_path, force)?,
    }
    Ok(())
}

fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file {:?} already exists (use --force to overwrite)",
            config_path
        );
    }

    Config::default().save(config_path)?;
    println!("Wrote default configuration to {:?}", config_path);
    Ok(())
}
