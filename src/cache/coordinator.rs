//! Refresh coordination for one provider's cache record.
//!
//! There is no lock. The `update-in-progress` flag lives in the store and
//! its check-then-set is not atomic, so two instances can refresh at the
//! same time. Both write the same merged data, which makes the duplicate
//! harmless.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::record::{CacheKeys, CacheRecord, CacheState};
use crate::aggregator::{self, V4, V6};
use crate::config::Config;
use crate::error::CacheError;
use crate::fetcher::ProviderFetcher;
use crate::metrics::{Metrics, MetricsRecord};
use crate::store::{self, RangeStore};
use crate::utils::{format_count, truncate};

/// Longest `last-error` value written to the store
const MAX_ERROR_LEN: usize = 1024;

/// Timing knobs for the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub fetch_timeout: Duration,
    pub refresh_stuck_after: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(10),
            refresh_stuck_after: Duration::from_secs(120),
        }
    }
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.ttl(),
            fetch_timeout: config.fetch_timeout(),
            refresh_stuck_after: config.refresh_stuck_after(),
        }
    }

    fn ttl_delta(&self) -> chrono::Duration {
        to_delta(self.ttl)
    }

    fn stuck_after_delta(&self) -> chrono::Duration {
        to_delta(self.refresh_stuck_after)
    }
}

fn to_delta(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// Result of one refresh run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    /// At least one fetcher succeeded and new ranges were written
    pub success: bool,
    pub message: String,
    pub ipv4_count: usize,
    pub ipv6_count: usize,
}

/// Result of a reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    pub success: bool,
    pub message: String,
}

/// Read-only view of the cache, as reported by `status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub update_in_progress: bool,
    pub state: CacheState,
    pub age_in_seconds: Option<i64>,
    pub ipv4_count: usize,
    pub ipv6_count: usize,
    pub metrics: MetricsRecord,
}

/// Data handed to a caller, plus the refresh it started in the background
pub struct Served {
    pub record: CacheRecord,
    pub background: Option<JoinHandle<RefreshOutcome>>,
}

/// Decides when to refresh, runs refreshes and keeps metrics up to date.
pub struct RefreshCoordinator {
    store: Arc<dyn RangeStore>,
    fetchers: Vec<Arc<dyn ProviderFetcher>>,
    keys: CacheKeys,
    metrics: Metrics,
    settings: CacheSettings,
}

impl RefreshCoordinator {
    pub fn new(
        provider_id: &str,
        store: Arc<dyn RangeStore>,
        fetchers: Vec<Arc<dyn ProviderFetcher>>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            fetchers,
            keys: CacheKeys::for_provider(provider_id),
            metrics: Metrics::new(provider_id),
            settings,
        }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub async fn load(&self) -> CacheRecord {
        CacheRecord::load(self.store.as_ref(), &self.keys).await
    }

    /// Return the data to serve, refreshing first when there is none.
    ///
    /// | record            | action                          | metric |
    /// |-------------------|---------------------------------|--------|
    /// | refresh running   | serve as-is                     | hit    |
    /// | empty             | refresh and wait for it         | miss   |
    /// | stale             | serve, refresh in background    | miss   |
    /// | fresh             | serve                           | hit    |
    pub async fn get_ranges(self: &Arc<Self>) -> Result<Served, CacheError> {
        let now = Utc::now();
        let record = self.load().await;
        let store = self.store.as_ref();

        if record.refresh_in_progress(now, self.settings.stuck_after_delta()) {
            debug!("Refresh already in progress, serving current data");
            self.metrics.record_access(store, now, true).await;
            return Ok(Served {
                record,
                background: None,
            });
        }

        match record.state(now, self.settings.ttl_delta()) {
            CacheState::Empty => {
                info!("Cache is empty, refreshing before serving");
                self.metrics.record_access(store, now, false).await;
                let outcome = self
                    .spawn_refresh()
                    .await
                    .await
                    .map_err(|e| CacheError::RefreshTask(e.to_string()))?;
                debug!("Initial refresh finished: {}", outcome.message);

                let record = self.load().await;
                if !record.has_ranges() {
                    let reason = record
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "refresh produced no ranges".to_string());
                    return Err(CacheError::Unavailable(reason));
                }
                Ok(Served {
                    record,
                    background: None,
                })
            }
            CacheState::Stale => {
                info!("Cache is stale, serving old data and refreshing in background");
                self.metrics.record_access(store, now, false).await;
                let handle = self.spawn_refresh().await;
                Ok(Served {
                    record,
                    background: Some(handle),
                })
            }
            CacheState::Fresh => {
                self.metrics.record_access(store, now, true).await;
                Ok(Served {
                    record,
                    background: None,
                })
            }
        }
    }

    /// Mark a refresh as running, then run it on its own task.
    ///
    /// The flag is written before the task is spawned so a caller arriving
    /// right after sees it. The task is not cancelled if the handle is
    /// dropped.
    pub async fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<RefreshOutcome> {
        let started = Utc::now();
        self.mark_in_progress(started).await;
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_refresh().await })
    }

    /// Fetch, merge and store new ranges now.
    pub async fn refresh_cache(&self) -> RefreshOutcome {
        self.mark_in_progress(Utc::now()).await;
        self.run_refresh().await
    }

    async fn mark_in_progress(&self, now: DateTime<Utc>) {
        let store = self.store.as_ref();
        store::write(store, &self.keys.update_in_progress, "true").await;
        store::write_timestamp(store, &self.keys.last_attempt, now).await;
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        let store = self.store.as_ref();

        let results = join_all(self.fetchers.iter().map(|f| self.fetch_one(f.as_ref()))).await;

        let mut raw = Vec::new();
        let mut errors = Vec::new();
        let mut succeeded = 0;
        for result in results {
            match result {
                Ok(prefixes) => {
                    succeeded += 1;
                    raw.extend(prefixes);
                }
                Err(message) => errors.push(message),
            }
        }

        let (v4_raw, v6_raw) = aggregator::split_families(&raw);
        let v4 = aggregator::merge::<V4, _>(&v4_raw);
        let v6 = aggregator::merge::<V6, _>(&v6_raw);

        let outcome = if succeeded == 0 || (v4.is_empty() && v6.is_empty()) {
            let message = if succeeded == 0 && !errors.is_empty() {
                format!("All providers failed: {}", errors.join("; "))
            } else if self.fetchers.is_empty() {
                "No providers configured".to_string()
            } else if errors.is_empty() {
                "Providers returned no valid prefixes".to_string()
            } else {
                format!(
                    "Providers returned no valid prefixes; failed: {}",
                    errors.join("; ")
                )
            };
            error!("Refresh failed: {}", message);
            store::write(store, &self.keys.last_error, &truncate(&message, MAX_ERROR_LEN)).await;

            let existing = self.load().await;
            RefreshOutcome {
                success: false,
                message,
                ipv4_count: existing.v4_ranges.len(),
                ipv6_count: existing.v6_ranges.len(),
            }
        } else {
            let now = Utc::now();
            store::write_list(store, &self.keys.ipv4, &v4).await;
            store::write_list(store, &self.keys.ipv6, &v6).await;
            store::write_timestamp(store, &self.keys.last_updated, now).await;

            if errors.is_empty() {
                if let Err(e) = self.store.delete(&self.keys.last_error).await {
                    warn!("Failed to clear {}: {}", self.keys.last_error, e);
                }
            } else {
                let message = format!("Some providers failed: {}", errors.join("; "));
                warn!("{}", message);
                store::write(store, &self.keys.last_error, &truncate(&message, MAX_ERROR_LEN))
                    .await;
            }

            info!(
                "Cached {} IPv4 ranges ({} addresses) and {} IPv6 ranges from {} raw prefixes",
                format_count(v4.len()),
                aggregator::count_addresses(&v4),
                format_count(v6.len()),
                format_count(raw.len())
            );

            RefreshOutcome {
                success: true,
                message: format!(
                    "Refreshed from {} of {} providers",
                    succeeded,
                    self.fetchers.len()
                ),
                ipv4_count: v4.len(),
                ipv6_count: v6.len(),
            }
        };

        self.metrics.record_refresh(store, Utc::now()).await;
        store::write(store, &self.keys.update_in_progress, "false").await;

        outcome
    }

    async fn fetch_one(&self, fetcher: &dyn ProviderFetcher) -> Result<Vec<String>, String> {
        let timeout = self.settings.fetch_timeout;
        match tokio::time::timeout(timeout, fetcher.fetch()).await {
            Ok(Ok(payload)) => Ok(payload.prefixes),
            Ok(Err(e)) => {
                warn!("{} fetch failed: {:#}", fetcher.name(), e);
                Err(format!("{}: {:#}", fetcher.name(), e))
            }
            Err(_) => {
                warn!("{} fetch timed out after {:?}", fetcher.name(), timeout);
                Err(format!("{}: timed out after {:?}", fetcher.name(), timeout))
            }
        }
    }

    /// Delete every cache key of the provider. Metrics survive.
    pub async fn reset_cache(&self) -> ResetOutcome {
        let store = self.store.as_ref();

        let keys = match store.list(&self.keys.namespace).await {
            Ok(keys) => keys,
            Err(e) => {
                error!("Failed to list cache keys: {}", e);
                return ResetOutcome {
                    success: false,
                    message: format!("Failed to reset cache: {}", e),
                };
            }
        };

        let mut failed = Vec::new();
        for key in &keys {
            if let Err(e) = store.delete(key).await {
                warn!("Failed to delete {}: {}", key, e);
                failed.push(key.as_str());
            }
        }

        self.metrics.record_reset(store, Utc::now()).await;

        if failed.is_empty() {
            info!("Cache reset, {} keys removed", keys.len());
            ResetOutcome {
                success: true,
                message: "Cache reset successfully. The next request will refresh it.".to_string(),
            }
        } else {
            ResetOutcome {
                success: false,
                message: format!("Failed to reset cache: could not delete {}", failed.join(", ")),
            }
        }
    }

    /// Current record and metrics. Never triggers a refresh.
    pub async fn status(&self) -> CacheStatus {
        let now = Utc::now();
        let record = self.load().await;
        let metrics = self.metrics.load(self.store.as_ref()).await;

        CacheStatus {
            state: record.state(now, self.settings.ttl_delta()),
            update_in_progress: record.refresh_in_progress(now, self.settings.stuck_after_delta()),
            age_in_seconds: record.age(now).map(|age| age.num_seconds()),
            ipv4_count: record.v4_ranges.len(),
            ipv6_count: record.v6_ranges.len(),
            last_updated: record.last_updated,
            last_error: record.last_error,
            last_attempt: record.last_attempt,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::mock::StaticFetcher;
    use crate::fetcher::{MockProviderFetcher, RawPrefixes};
    use crate::store::MemoryStore;

    fn coordinator(
        store: &MemoryStore,
        fetchers: Vec<Arc<dyn ProviderFetcher>>,
    ) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(
            "putio",
            Arc::new(store.clone()),
            fetchers,
            CacheSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_refresh_merges_and_splits_families() {
        let store = MemoryStore::new();
        let ripe = Arc::new(StaticFetcher::ok(
            "ripe",
            &["10.0.0.0/25", "10.0.0.128/25", "2001:db8::/33"],
        ));
        let bgp = Arc::new(StaticFetcher::ok(
            "bgp",
            &["10.0.0.0/24", "2001:db8:8000::/33", "not-a-prefix"],
        ));
        let coordinator = coordinator(&store, vec![ripe, bgp]);

        let outcome = coordinator.refresh_cache().await;
        assert!(outcome.success);
        assert_eq!(outcome.ipv4_count, 1);
        assert_eq!(outcome.ipv6_count, 1);

        let record = coordinator.load().await;
        assert_eq!(record.v4_ranges, vec!["10.0.0.0/24"]);
        assert_eq!(record.v6_ranges, vec!["2001:db8::/32"]);
        assert!(record.last_updated.is_some());
        assert!(record.last_attempt.is_some());
        assert_eq!(record.last_error, None);
        assert!(!record.update_in_progress);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_data() {
        let store = MemoryStore::new();
        let coordinator = coordinator(
            &store,
            vec![
                Arc::new(StaticFetcher::ok("ripe", &["192.0.2.0/24"])),
                Arc::new(StaticFetcher::failing("bgp", "HTTP 503")),
            ],
        );

        let outcome = coordinator.refresh_cache().await;
        assert!(outcome.success);

        let record = coordinator.load().await;
        assert_eq!(record.v4_ranges, vec!["192.0.2.0/24"]);
        let error = record.last_error.unwrap();
        assert!(error.contains("bgp: HTTP 503"), "{}", error);
    }

    #[tokio::test]
    async fn test_total_failure_keeps_previous_ranges() {
        let store = MemoryStore::new();
        let good = coordinator(&store, vec![Arc::new(StaticFetcher::ok("ripe", &["192.0.2.0/24"]))]);
        good.refresh_cache().await;
        let before = good.load().await;

        let bad = coordinator(
            &store,
            vec![
                Arc::new(StaticFetcher::failing("ripe", "HTTP 500")),
                Arc::new(StaticFetcher::failing("bgp", "HTTP 502")),
            ],
        );
        let outcome = bad.refresh_cache().await;
        assert!(!outcome.success);
        assert_eq!(outcome.ipv4_count, 1);

        let after = bad.load().await;
        assert_eq!(after.v4_ranges, before.v4_ranges);
        assert_eq!(after.last_updated, before.last_updated);
        let error = after.last_error.unwrap();
        assert!(error.contains("ripe: HTTP 500") && error.contains("bgp: HTTP 502"));
        assert!(!after.update_in_progress);
        assert_eq!(Metrics::new("putio").load(&store).await.refresh_count, 2);
    }

    #[tokio::test]
    async fn test_empty_payloads_do_not_wipe_ranges() {
        let store = MemoryStore::new();
        coordinator(&store, vec![Arc::new(StaticFetcher::ok("ripe", &["192.0.2.0/24"]))])
            .refresh_cache()
            .await;

        let empty = coordinator(&store, vec![Arc::new(StaticFetcher::ok("ripe", &[]))]);
        let outcome = empty.refresh_cache().await;
        assert!(!outcome.success);
        assert_eq!(empty.load().await.v4_ranges, vec!["192.0.2.0/24"]);
    }

    #[tokio::test]
    async fn test_empty_payload_keeps_other_provider_errors() {
        let store = MemoryStore::new();
        let coordinator = coordinator(
            &store,
            vec![
                Arc::new(StaticFetcher::ok("ripe", &[])),
                Arc::new(StaticFetcher::failing("bgp", "HTTP 503")),
            ],
        );

        match coordinator.get_ranges().await {
            Err(CacheError::Unavailable(reason)) => {
                assert!(reason.contains("bgp: HTTP 503"), "{}", reason)
            }
            other => panic!("expected Unavailable, got {:?}", other.map(|s| s.record)),
        }

        let error = coordinator.load().await.last_error.unwrap();
        assert!(error.contains("no valid prefixes"), "{}", error);
        assert!(error.contains("bgp: HTTP 503"), "{}", error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetcher_times_out() {
        let store = MemoryStore::new();
        let coordinator = coordinator(
            &store,
            vec![
                Arc::new(StaticFetcher::ok("ripe", &["192.0.2.0/24"])),
                Arc::new(
                    StaticFetcher::ok("bgp", &["198.51.100.0/24"])
                        .with_delay(Duration::from_secs(60)),
                ),
            ],
        );

        let outcome = coordinator.refresh_cache().await;
        assert!(outcome.success);
        assert_eq!(coordinator.load().await.v4_ranges, vec!["192.0.2.0/24"]);
        assert!(coordinator.load().await.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_fresh_cache_is_a_hit_without_fetching() {
        let store = MemoryStore::new();
        let ripe = Arc::new(StaticFetcher::ok("ripe", &["192.0.2.0/24"]));
        let coordinator = coordinator(&store, vec![ripe.clone()]);

        coordinator.get_ranges().await.unwrap();
        let served = coordinator.get_ranges().await.unwrap();
        assert!(served.background.is_none());
        assert_eq!(ripe.calls(), 1);

        let metrics = Metrics::new("putio").load(&store).await;
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert!(metrics.last_accessed.is_some());
    }

    #[tokio::test]
    async fn test_stale_cache_served_while_refreshing() {
        let store = MemoryStore::new();
        let keys = CacheKeys::for_provider("putio");
        store.put(&keys.ipv4, "192.0.2.0/24").await.unwrap();
        let old = Utc::now() - chrono::Duration::hours(2);
        store::write_timestamp(&store, &keys.last_updated, old).await;

        let ripe = Arc::new(StaticFetcher::ok("ripe", &["198.51.100.0/24"]));
        let coordinator = coordinator(&store, vec![ripe.clone()]);

        let served = coordinator.get_ranges().await.unwrap();
        assert_eq!(served.record.v4_ranges, vec!["192.0.2.0/24"]);

        // The flag is set before the background task runs
        let second = coordinator.get_ranges().await.unwrap();
        assert!(second.background.is_none());

        served.background.unwrap().await.unwrap();
        assert_eq!(ripe.calls(), 1);
        assert_eq!(coordinator.load().await.v4_ranges, vec!["198.51.100.0/24"]);
    }

    #[tokio::test]
    async fn test_stuck_flag_is_ignored() {
        let store = MemoryStore::new();
        let keys = CacheKeys::for_provider("putio");
        store.put(&keys.update_in_progress, "true").await.unwrap();
        let long_ago = Utc::now() - chrono::Duration::minutes(30);
        store::write_timestamp(&store, &keys.last_attempt, long_ago).await;

        let ripe = Arc::new(StaticFetcher::ok("ripe", &["192.0.2.0/24"]));
        let coordinator = coordinator(&store, vec![ripe.clone()]);

        let served = coordinator.get_ranges().await.unwrap();
        assert_eq!(served.record.v4_ranges, vec!["192.0.2.0/24"]);
        assert_eq!(ripe.calls(), 1);
    }

    #[tokio::test]
    async fn test_recent_flag_serves_without_refresh() {
        let store = MemoryStore::new();
        let keys = CacheKeys::for_provider("putio");
        store.put(&keys.update_in_progress, "true").await.unwrap();
        store::write_timestamp(&store, &keys.last_attempt, Utc::now()).await;

        let mut fetcher = MockProviderFetcher::new();
        fetcher.expect_name().return_const("mock");
        fetcher.expect_fetch().never();
        let coordinator = coordinator(&store, vec![Arc::new(fetcher)]);

        let served = coordinator.get_ranges().await.unwrap();
        assert!(!served.record.has_ranges());
        assert_eq!(Metrics::new("putio").load(&store).await.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_first_population_failure_is_unavailable() {
        let store = MemoryStore::new();
        let coordinator = coordinator(&store, vec![Arc::new(StaticFetcher::failing("ripe", "HTTP 500"))]);

        match coordinator.get_ranges().await {
            Err(CacheError::Unavailable(reason)) => assert!(reason.contains("HTTP 500")),
            other => panic!("expected Unavailable, got {:?}", other.map(|s| s.record)),
        }
    }

    #[tokio::test]
    async fn test_reset_clears_ranges_and_keeps_metrics() {
        let store = MemoryStore::new();
        let mut fetcher = MockProviderFetcher::new();
        fetcher.expect_name().return_const("mock");
        fetcher.expect_fetch().times(2).returning(|| {
            Ok(RawPrefixes {
                source: "mock".to_string(),
                prefixes: vec!["192.0.2.0/24".to_string()],
            })
        });
        let coordinator = coordinator(&store, vec![Arc::new(fetcher)]);

        coordinator.get_ranges().await.unwrap();
        coordinator.get_ranges().await.unwrap();

        let outcome = coordinator.reset_cache().await;
        assert!(outcome.success);
        assert!(store.list("ranges:putio:").await.unwrap().is_empty());

        // Exactly one more fetch repopulates it
        let served = coordinator.get_ranges().await.unwrap();
        assert_eq!(served.record.v4_ranges, vec!["192.0.2.0/24"]);

        let metrics = Metrics::new("putio").load(&store).await;
        assert_eq!(metrics.reset_count, 1);
        assert_eq!(metrics.cache_resets, 1);
        assert_eq!(metrics.refresh_count, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 2);
    }

    #[tokio::test]
    async fn test_status_does_not_refresh() {
        let store = MemoryStore::new();
        let ripe = Arc::new(StaticFetcher::ok("ripe", &["192.0.2.0/24"]));
        let coordinator = coordinator(&store, vec![ripe.clone()]);

        let status = coordinator.status().await;
        assert_eq!(status.state, CacheState::Empty);
        assert_eq!(status.age_in_seconds, None);
        assert_eq!(ripe.calls(), 0);

        coordinator.refresh_cache().await;
        let status = coordinator.status().await;
        assert_eq!(status.state, CacheState::Fresh);
        assert_eq!(status.ipv4_count, 1);
        assert!(!status.update_in_progress);
        assert_eq!(status.metrics.refresh_count, 1);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "fresh");
        assert_eq!(json["ipv4Count"], 1);
        assert!(json["ageInSeconds"].is_number());
        assert_eq!(json["metrics"]["refreshCount"], 1);
    }
}
