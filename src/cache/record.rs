//! Cached ranges and refresh metadata for one provider.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::store::{self, RangeStore};

/// Store key names for one provider's cache record
#[derive(Debug, Clone)]
pub struct CacheKeys {
    /// Common prefix of every key below, used to clear the record
    pub namespace: String,
    pub ipv4: String,
    pub ipv6: String,
    pub last_updated: String,
    pub last_error: String,
    pub last_attempt: String,
    pub update_in_progress: String,
}

impl CacheKeys {
    pub fn for_provider(provider_id: &str) -> Self {
        let namespace = format!("ranges:{}:", provider_id);
        Self {
            ipv4: format!("{}ipv4", namespace),
            ipv6: format!("{}ipv6", namespace),
            last_updated: format!("{}meta:last-updated", namespace),
            last_error: format!("{}meta:last-error", namespace),
            last_attempt: format!("{}meta:last-attempt", namespace),
            update_in_progress: format!("{}meta:update-in-progress", namespace),
            namespace,
        }
    }
}

/// Lifecycle position of a cache record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Never populated (or reset since)
    Empty,
    Fresh,
    Stale,
}

/// Snapshot of one provider's cache as read from the store.
///
/// Each field is read independently; a crash between writes can leave
/// ranges newer than `last_updated` or the reverse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    pub v4_ranges: Vec<String>,
    pub v6_ranges: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub update_in_progress: bool,
}

impl CacheRecord {
    pub async fn load(store: &dyn RangeStore, keys: &CacheKeys) -> Self {
        Self {
            v4_ranges: store::read_list(store, &keys.ipv4).await,
            v6_ranges: store::read_list(store, &keys.ipv6).await,
            last_updated: store::read_timestamp(store, &keys.last_updated).await,
            last_error: store::read_string(store, &keys.last_error).await,
            last_attempt: store::read_timestamp(store, &keys.last_attempt).await,
            update_in_progress: store::read_bool(store, &keys.update_in_progress).await,
        }
    }

    pub fn has_ranges(&self) -> bool {
        !self.v4_ranges.is_empty() || !self.v6_ranges.is_empty()
    }

    /// `last_updated` absent, or older than `ttl`
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.last_updated {
            Some(updated) => now.signed_duration_since(updated) > ttl,
            None => true,
        }
    }

    pub fn state(&self, now: DateTime<Utc>, ttl: Duration) -> CacheState {
        if self.last_updated.is_none() {
            CacheState::Empty
        } else if self.is_stale(now, ttl) {
            CacheState::Stale
        } else {
            CacheState::Fresh
        }
    }

    /// Whether another refresh should be considered running.
    ///
    /// The flag only counts while `last_attempt` is recent; a flag older
    /// than `stuck_after` is left over from a refresh that never finished.
    pub fn refresh_in_progress(&self, now: DateTime<Utc>, stuck_after: Duration) -> bool {
        if !self.update_in_progress {
            return false;
        }
        match self.last_attempt {
            Some(attempt) => now.signed_duration_since(attempt) <= stuck_after,
            None => false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_updated
            .map(|updated| now.signed_duration_since(updated))
    }
}
