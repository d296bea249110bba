//! CLI command implementations.

pub mod config;
pub mod refresh;
pub mod reset;
pub mod script;
pub mod status;

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use crate::cache::RangeCache;
use crate::config::Config;

/// Extra time allowed for a background refresh beyond the fetch timeout
const BACKGROUND_GRACE: Duration = Duration::from_secs(30);

/// Load the config (defaults when the file is missing) and open the cache
/// of the selected provider.
pub(crate) fn open_cache(config_path: &Path, provider: Option<&str>) -> Result<RangeCache> {
    let config = Config::load_or_default(config_path)?;
    RangeCache::from_config(&config, provider)
}

/// How long the CLI waits for a background refresh before exiting
pub(crate) fn background_wait_limit(cache: &RangeCache) -> Duration {
    cache.settings().fetch_timeout + BACKGROUND_GRACE
}
