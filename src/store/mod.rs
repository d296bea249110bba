//! Key/value store holding cached ranges, metadata and counters.
//!
//! The store offers get/put/delete/list on flat string keys and nothing
//! more: there are no multi-key transactions. Every typed read in this
//! module falls back to a zero value (0, false, absent) when a key is
//! missing, unparseable or the store itself fails, so a half-written
//! record never turns into an error for the caller.

mod file;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;

/// Separator used when a list of ranges is stored under one key.
const LIST_SEPARATOR: &str = "\n";

/// Trait for range store backends
#[async_trait]
pub trait RangeStore: Send + Sync {
    /// Read a key. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Open the durable store used by the CLI.
pub fn open_file_store<P: AsRef<Path>>(path: P) -> Arc<dyn RangeStore> {
    Arc::new(FileStore::new(path))
}

/// Read a non-empty string value.
pub async fn read_string(store: &dyn RangeStore, key: &str) -> Option<String> {
    match store.get(key).await {
        Ok(Some(value)) if !value.is_empty() => Some(value),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to read {}: {}", key, e);
            None
        }
    }
}

/// Read a counter, 0 when absent or corrupt.
pub async fn read_u64(store: &dyn RangeStore, key: &str) -> u64 {
    read_string(store, key)
        .await
        .and_then(|v| match v.trim().parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => {
                debug!("Ignoring non-numeric value for {}", key);
                None
            }
        })
        .unwrap_or(0)
}

/// Read a flag, false unless the stored value is exactly `true`.
pub async fn read_bool(store: &dyn RangeStore, key: &str) -> bool {
    read_string(store, key)
        .await
        .is_some_and(|v| v.trim() == "true")
}

/// Read an RFC 3339 timestamp.
pub async fn read_timestamp(store: &dyn RangeStore, key: &str) -> Option<DateTime<Utc>> {
    let value = read_string(store, key).await?;
    match DateTime::parse_from_rfc3339(value.trim()) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(_) => {
            debug!("Ignoring malformed timestamp for {}", key);
            None
        }
    }
}

/// Read a list stored as a joined string.
pub async fn read_list(store: &dyn RangeStore, key: &str) -> Vec<String> {
    read_string(store, key)
        .await
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

/// Write a value, logging instead of failing.
///
/// Returns whether the write succeeded.
pub async fn write(store: &dyn RangeStore, key: &str, value: &str) -> bool {
    match store.put(key, value).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to write {}: {}", key, e);
            false
        }
    }
}

pub async fn write_timestamp(store: &dyn RangeStore, key: &str, ts: DateTime<Utc>) -> bool {
    write(store, key, &format_timestamp(ts)).await
}

pub async fn write_list(store: &dyn RangeStore, key: &str, values: &[String]) -> bool {
    write(store, key, &values.join(LIST_SEPARATOR)).await
}

/// Read-increment-write a counter. Not atomic: concurrent increments from
/// different instances can be lost.
pub async fn increment(store: &dyn RangeStore, key: &str) -> u64 {
    let next = read_u64(store, key).await.saturating_add(1);
    write(store, key, &next.to_string()).await;
    next
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_missing_keys_default_to_zero_values() {
        let store = MemoryStore::new();
        assert_eq!(read_string(&store, "k").await, None);
        assert_eq!(read_u64(&store, "k").await, 0);
        assert!(!read_bool(&store, "k").await);
        assert_eq!(read_timestamp(&store, "k").await, None);
        assert!(read_list(&store, "k").await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_values_default_to_zero_values() {
        let store = MemoryStore::new();
        store.put("count", "twelve").await.unwrap();
        store.put("flag", "yes").await.unwrap();
        store.put("ts", "yesterday").await.unwrap();
        assert_eq!(read_u64(&store, "count").await, 0);
        assert!(!read_bool(&store, "flag").await);
        assert_eq!(read_timestamp(&store, "ts").await, None);
    }

    #[tokio::test]
    async fn test_empty_string_reads_as_absent() {
        let store = MemoryStore::new();
        store.put("err", "").await.unwrap();
        assert_eq!(read_string(&store, "err").await, None);
    }

    #[tokio::test]
    async fn test_list_roundtrip_skips_blank_lines() {
        let store = MemoryStore::new();
        store.put("list", "10.0.0.0/24\n\n 10.0.2.0/24 \n").await.unwrap();
        assert_eq!(read_list(&store, "list").await, vec!["10.0.0.0/24", "10.0.2.0/24"]);

        let values = vec!["2001:db8::/32".to_string(), "2001:db9::/32".to_string()];
        assert!(write_list(&store, "list", &values).await);
        assert_eq!(read_list(&store, "list").await, values);
        assert_eq!(
            store.get("list").await.unwrap().as_deref(),
            Some("2001:db8::/32\n2001:db9::/32")
        );
    }

    #[tokio::test]
    async fn test_increment() {
        let store = MemoryStore::new();
        assert_eq!(increment(&store, "hits").await, 1);
        assert_eq!(increment(&store, "hits").await, 2);
        assert_eq!(read_u64(&store, "hits").await, 2);
    }

    #[tokio::test]
    async fn test_timestamp_roundtrip() {
        let store = MemoryStore::new();
        let ts = Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 0).unwrap();
        assert!(write_timestamp(&store, "ts", ts).await);
        assert_eq!(store.get("ts").await.unwrap().unwrap(), "2026-10-18T12:30:00.000Z");
        assert_eq!(read_timestamp(&store, "ts").await, Some(ts));
    }
}
