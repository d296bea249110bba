//! # prefixcache - Provider IP-range cache for MikroTik RouterOS
//!
//! Discovers the IP ranges announced by a network provider (put.io, AS9009
//! by default), merges them into a minimal CIDR list per address family,
//! caches the result in a shared key/value store and renders it as a
//! RouterOS firewall address-list script.
//!
//! ## Features
//!
//! - **Two Sources** - Registry (RIPEstat) and routing aggregator (BGPView) queried in parallel
//! - **CIDR Merging** - Nested, duplicate and sibling ranges collapse; merging is idempotent
//! - **Stale-While-Refresh** - Old data is served while a refresh runs in the background
//! - **Fail-Soft** - A failing source never wipes data; partial results are kept
//! - **Shared State** - Every instance reads through the store, no process-local copy
//! - **Deterministic Output** - Unchanged cache data renders byte-identical scripts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       prefixcache                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: script, status, reset, refresh, config     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RangeCache (facade, one per provider)                      │
//! │    └── RefreshCoordinator: staleness, refresh, metrics      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetchers (reqwest + rustls)        Script (RouterOS)       │
//! │    ├── RIPEstat announced prefixes                          │
//! │    └── BGPView ASN prefixes                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Aggregator (ipnet)                                         │
//! │    └── Generic merge over the V4 / V6 AddressFamily         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RangeStore (get/put/delete/list)                           │
//! │    ├── FileStore (JSON file, atomic writes)                 │
//! │    └── MemoryStore (tests, embedding)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use prefixcache::cache::RangeCache;
//! use prefixcache::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("/etc/prefixcache/config.yaml")?;
//!     let cache = RangeCache::from_config(&config, Some("putio"))?;
//!
//!     let script = cache.script().await?;
//!     print!("{}", script);
//!
//!     // Let a background refresh finish before exiting
//!     cache
//!         .wait_for_background(std::time::Duration::from_secs(30))
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - CIDR merging per address family
//! - [`cache`] - Cache facade and refresh coordination
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error types crossing the library boundary
//! - [`fetcher`] - HTTP fetchers for provider prefix lists
//! - [`metrics`] - Per-provider counters and timestamps
//! - [`script`] - RouterOS script rendering
//! - [`signal`] - Graceful shutdown signal handling
//! - [`store`] - Key/value store backends
//! - [`utils`] - Common utility functions (formatting, truncation)

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod script;
pub mod signal;
pub mod store;
pub mod utils;

pub use cache::RangeCache;
pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::CacheError;
