//! Per-provider cache metrics.
//!
//! Each counter and timestamp is its own key so updating one never needs a
//! multi-key write. Counters only ever go up.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{self, RangeStore};

/// Metric key names for one provider
#[derive(Debug, Clone)]
pub struct MetricKeys {
    pub cache_hits: String,
    pub cache_misses: String,
    pub refresh_count: String,
    pub reset_count: String,
    pub cache_resets: String,
    pub last_accessed: String,
    pub last_refresh: String,
    pub last_reset: String,
}

impl MetricKeys {
    pub fn for_provider(provider_id: &str) -> Self {
        let key = |name: &str| format!("metrics:{}:{}", provider_id, name);
        Self {
            cache_hits: key("cache-hits"),
            cache_misses: key("cache-misses"),
            refresh_count: key("refresh-count"),
            reset_count: key("reset-count"),
            cache_resets: key("cache-resets"),
            last_accessed: key("last-accessed"),
            last_refresh: key("last-refresh"),
            last_reset: key("last-reset"),
        }
    }
}

/// Snapshot of the metrics for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_resets: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub refresh_count: u64,
    pub last_reset: Option<DateTime<Utc>>,
    pub reset_count: u64,
}

/// Reads and updates the metric keys of one provider.
#[derive(Clone)]
pub struct Metrics {
    keys: MetricKeys,
}

impl Metrics {
    pub fn new(provider_id: &str) -> Self {
        Self {
            keys: MetricKeys::for_provider(provider_id),
        }
    }

    pub fn keys(&self) -> &MetricKeys {
        &self.keys
    }

    /// Load all metrics. Missing or corrupt keys read as zero / absent.
    pub async fn load(&self, store: &dyn RangeStore) -> MetricsRecord {
        MetricsRecord {
            cache_hits: store::read_u64(store, &self.keys.cache_hits).await,
            cache_misses: store::read_u64(store, &self.keys.cache_misses).await,
            cache_resets: store::read_u64(store, &self.keys.cache_resets).await,
            last_accessed: store::read_timestamp(store, &self.keys.last_accessed).await,
            last_refresh: store::read_timestamp(store, &self.keys.last_refresh).await,
            refresh_count: store::read_u64(store, &self.keys.refresh_count).await,
            last_reset: store::read_timestamp(store, &self.keys.last_reset).await,
            reset_count: store::read_u64(store, &self.keys.reset_count).await,
        }
    }

    pub async fn record_access(&self, store: &dyn RangeStore, now: DateTime<Utc>, hit: bool) {
        store::write_timestamp(store, &self.keys.last_accessed, now).await;
        let counter = if hit {
            &self.keys.cache_hits
        } else {
            &self.keys.cache_misses
        };
        store::increment(store, counter).await;
    }

    pub async fn record_refresh(&self, store: &dyn RangeStore, now: DateTime<Utc>) {
        store::increment(store, &self.keys.refresh_count).await;
        store::write_timestamp(store, &self.keys.last_refresh, now).await;
    }

    pub async fn record_reset(&self, store: &dyn RangeStore, now: DateTime<Utc>) {
        store::increment(store, &self.keys.reset_count).await;
        store::increment(store, &self.keys.cache_resets).await;
        store::write_timestamp(store, &self.keys.last_reset, now).await;
    }
}
