//! Configuration management for prefixcache.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/prefixcache/config.yaml";

const DEFAULT_STORE_PATH: &str = "/var/lib/prefixcache/store.json";

/// Parse an interval such as "90s", "30m", "1h" or "1d".
/// Requires ASCII-only input to prevent Unicode-related edge cases
pub fn parse_interval(interval: &str) -> Option<Duration> {
    let interval = interval.trim();
    if !interval.is_ascii() || interval.len() < 2 {
        return None;
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);
    let value: u64 = num_part.parse().ok()?;
    let multiplier = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return None,
    };

    value.checked_mul(multiplier).map(Duration::from_secs)
}

/// Provider ids end up in store keys and RouterOS list names
fn is_valid_provider_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 32
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the JSON store file shared by all instances
    pub store_path: PathBuf,

    /// Age after which cached ranges are refreshed (e.g. "1h")
    pub ttl: String,

    /// Timeout for each individual provider fetch (e.g. "10s")
    pub fetch_timeout: String,

    /// An in-progress flag older than this is treated as left over from a
    /// crashed refresh (e.g. "2m")
    pub refresh_stuck_after: String,

    /// Providers whose ranges are cached
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            ttl: "1h".to_string(),
            fetch_timeout: "10s".to_string(),
            refresh_stuck_after: "2m".to_string(),
            providers: vec![ProviderConfig::default()],
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ttl", &self.ttl),
            ("fetch_timeout", &self.fetch_timeout),
            ("refresh_stuck_after", &self.refresh_stuck_after),
        ] {
            match parse_interval(value) {
                Some(d) if !d.is_zero() => {}
                _ => anyhow::bail!(
                    "Invalid {} '{}'. Use format like '90s', '30m', '1h', '1d'",
                    name,
                    value
                ),
            }
        }

        if self.providers.is_empty() {
            anyhow::bail!("At least one provider must be configured");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !is_valid_provider_id(&provider.id) {
                anyhow::bail!(
                    "Invalid provider id '{}'. Use lowercase letters, digits, '-' or '_'",
                    provider.id
                );
            }
            if !seen.insert(provider.id.as_str()) {
                anyhow::bail!("Duplicate provider id '{}'", provider.id);
            }
            if provider.registry_url().is_none() && provider.aggregator_url().is_none() {
                anyhow::bail!("Provider '{}' has no enabled sources", provider.id);
            }
            for url in [provider.registry_url(), provider.aggregator_url()]
                .into_iter()
                .flatten()
            {
                if !url.starts_with("https://") {
                    anyhow::bail!("Provider '{}' URL must use HTTPS: {}", provider.id, url);
                }
            }
        }

        Ok(())
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = self.to_yaml()?;

        let parent_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", parent_dir))?;
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Find a provider by id, or the first configured provider
    pub fn provider(&self, id: Option<&str>) -> Result<&ProviderConfig> {
        match id {
            Some(id) => self
                .providers
                .iter()
                .find(|p| p.id == id)
                .with_context(|| format!("Unknown provider '{}'", id)),
            None => self
                .providers
                .first()
                .context("No providers configured"),
        }
    }

    pub fn ttl(&self) -> Duration {
        parse_interval(&self.ttl).unwrap_or(Duration::from_secs(3600))
    }

    pub fn fetch_timeout(&self) -> Duration {
        parse_interval(&self.fetch_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn refresh_stuck_after(&self) -> Duration {
        parse_interval(&self.refresh_stuck_after).unwrap_or(Duration::from_secs(120))
    }
}

/// A network provider identified by its autonomous system number
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Stable identifier: store namespace and RouterOS list name
    pub id: String,

    /// Human readable name used in script comments
    pub label: String,

    /// Autonomous system number whose announced prefixes are cached
    pub asn: u32,

    /// Query the registry-style announced-prefixes API
    pub registry_enabled: bool,

    /// Override for the registry API URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,

    /// Query the routing-aggregator prefixes API
    pub aggregator_enabled: bool,

    /// Override for the aggregator API URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "putio".to_string(),
            label: "put.io".to_string(),
            asn: 9009,
            registry_enabled: true,
            registry_url: None,
            aggregator_enabled: true,
            aggregator_url: None,
        }
    }
}

impl ProviderConfig {
    /// Effective registry URL, `None` when disabled
    pub fn registry_url(&self) -> Option<String> {
        if !self.registry_enabled {
            return None;
        }
        Some(self.registry_url.clone().unwrap_or_else(|| {
            format!(
                "https://stat.ripe.net/data/announced-prefixes/data.json?resource=AS{}",
                self.asn
            )
        }))
    }

    /// Effective aggregator URL, `None` when disabled
    pub fn aggregator_url(&self) -> Option<String> {
        if !self.aggregator_enabled {
            return None;
        }
        Some(
            self.aggregator_url
                .clone()
                .unwrap_or_else(|| format!("https://api.bgpview.io/asn/{}/prefixes", self.asn)),
        )
    }
}
