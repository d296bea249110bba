//! Provider range cache.
//!
//! [`RangeCache`] is the entry point: one instance per provider, addressed
//! by the provider id. All state lives in the [`RangeStore`], so any number
//! of instances (in one process or many) can share a cache.

mod coordinator;
mod record;

pub use coordinator::{
    CacheSettings, CacheStatus, RefreshCoordinator, RefreshOutcome, ResetOutcome, Served,
};
pub use record::{CacheKeys, CacheRecord, CacheState};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{Config, ProviderConfig};
use crate::error::CacheError;
use crate::fetcher::{self, HttpClient, ProviderFetcher};
use crate::script;
use crate::store::{self as range_store, RangeStore};

/// Cache facade for one provider.
pub struct RangeCache {
    provider: ProviderConfig,
    coordinator: Arc<RefreshCoordinator>,
    background: Mutex<Vec<JoinHandle<RefreshOutcome>>>,
}

impl RangeCache {
    pub fn new(
        provider: ProviderConfig,
        store: Arc<dyn RangeStore>,
        fetchers: Vec<Arc<dyn ProviderFetcher>>,
        settings: CacheSettings,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(&provider.id, store, fetchers, settings);
        Self {
            provider,
            coordinator: Arc::new(coordinator),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Build the cache for `provider_id` (or the first provider) with the
    /// configured file store and HTTP fetchers.
    pub fn from_config(config: &Config, provider_id: Option<&str>) -> Result<Self> {
        let provider = config.provider(provider_id)?.clone();
        let settings = CacheSettings::from_config(config);
        let http = Arc::new(
            HttpClient::new(settings.fetch_timeout).context("Failed to set up HTTP client")?,
        );
        let fetchers = fetcher::build_fetchers(&provider, http);
        let store = range_store::open_file_store(&config.store_path);

        Ok(Self::new(provider, store, fetchers, settings))
    }

    /// Stable name of the cached provider
    pub fn name(&self) -> &str {
        &self.provider.id
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn settings(&self) -> &CacheSettings {
        self.coordinator.settings()
    }

    /// RouterOS script for the cached ranges.
    ///
    /// Only fails when the cache has never held data and populating it
    /// failed. Stale data is returned as-is while a refresh runs in the
    /// background; see [`RangeCache::wait_for_background`].
    pub async fn script(&self) -> Result<String, CacheError> {
        let served = self.coordinator.get_ranges().await?;
        if let Some(handle) = served.background {
            self.background.lock().await.push(handle);
        }
        Ok(script::render(&self.provider, &served.record))
    }

    pub async fn status(&self) -> CacheStatus {
        self.coordinator.status().await
    }

    /// Clear cached ranges. The next `script` call repopulates them.
    pub async fn reset(&self) -> ResetOutcome {
        self.coordinator.reset_cache().await
    }

    /// Refresh now, regardless of staleness or a running refresh.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.coordinator.refresh_cache().await
    }

    /// Number of background refreshes not yet awaited
    pub async fn pending_background(&self) -> usize {
        self.background.lock().await.len()
    }

    /// Wait for background refreshes started by earlier calls.
    ///
    /// Each refresh gets at most `limit`. A refresh that does not finish in
    /// time keeps running on the runtime; it is simply no longer tracked.
    pub async fn wait_for_background(&self, limit: Duration) {
        let handles: Vec<_> = self.background.lock().await.drain(..).collect();
        for handle in handles {
            match tokio::time::timeout(limit, handle).await {
                Ok(Ok(outcome)) => debug!("Background refresh finished: {}", outcome.message),
                Ok(Err(e)) => warn!("Background refresh task failed: {}", e),
                Err(_) => warn!("Background refresh still running after {:?}", limit),
            }
        }
    }
}
