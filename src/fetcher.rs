//! HTTP fetchers for the prefix lists published by routing-data services.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::config::ProviderConfig;
use crate::utils::format_count;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;

/// Maximum response size per provider (5 MB)
/// A large ASN's prefix list is a few hundred KB, so 5 MB is ample
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

/// Raw prefixes returned by one fetcher, not yet validated or merged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPrefixes {
    pub source: String,
    pub prefixes: Vec<String>,
}

/// A source of raw prefix strings for one provider.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProviderFetcher: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Fetch and parse the current prefix list
    async fn fetch(&self) -> Result<RawPrefixes>;
}

/// Shared HTTP client with retry and size limits
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client whose individual requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("prefixcache/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// GET a URL with retry logic and size validation
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("Retry {} after {}ms for {}", attempt, delay, url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if let Some(content_length) = response.content_length() {
                            if content_length as usize > MAX_RESPONSE_SIZE {
                                anyhow::bail!(
                                    "Response too large: {} bytes (max: {} bytes)",
                                    content_length,
                                    MAX_RESPONSE_SIZE
                                );
                            }
                        }

                        let body = response
                            .text()
                            .await
                            .context("Failed to read response body")?;

                        if body.len() > MAX_RESPONSE_SIZE {
                            anyhow::bail!(
                                "Downloaded content too large: {} bytes (max: {} bytes)",
                                body.len(),
                                MAX_RESPONSE_SIZE
                            );
                        }

                        return Ok(body);
                    }

                    last_error = Some(anyhow::anyhow!("HTTP {}", status.as_u16()));

                    // Client errors will not improve on retry
                    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}

/// Registry-style announced-prefixes API (RIPEstat)
pub struct RegistryFetcher {
    http: Arc<HttpClient>,
    url: String,
}

impl RegistryFetcher {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ProviderFetcher for RegistryFetcher {
    fn name(&self) -> &'static str {
        "RIPEstat"
    }

    async fn fetch(&self) -> Result<RawPrefixes> {
        info!("Fetching {}...", self.name());

        let body = self
            .http
            .get_text(&self.url)
            .await
            .with_context(|| format!("Failed to fetch {} data", self.name()))?;
        let prefixes = parse_registry_payload(&body)
            .with_context(|| format!("Malformed {} response", self.name()))?;

        info!("Fetched {} - {} prefixes", self.name(), format_count(prefixes.len()));

        Ok(RawPrefixes {
            source: self.name().to_string(),
            prefixes,
        })
    }
}

/// Routing-aggregator ASN prefixes API (BGPView)
pub struct AggregatorFetcher {
    http: Arc<HttpClient>,
    url: String,
}

impl AggregatorFetcher {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ProviderFetcher for AggregatorFetcher {
    fn name(&self) -> &'static str {
        "BGPView"
    }

    async fn fetch(&self) -> Result<RawPrefixes> {
        info!("Fetching {}...", self.name());

        let body = self
            .http
            .get_text(&self.url)
            .await
            .with_context(|| format!("Failed to fetch {} data", self.name()))?;
        let prefixes = parse_aggregator_payload(&body)
            .with_context(|| format!("Malformed {} response", self.name()))?;

        info!("Fetched {} - {} prefixes", self.name(), format_count(prefixes.len()));

        Ok(RawPrefixes {
            source: self.name().to_string(),
            prefixes,
        })
    }
}

/// Build the fetchers configured for a provider
pub fn build_fetchers(
    provider: &ProviderConfig,
    http: Arc<HttpClient>,
) -> Vec<Arc<dyn ProviderFetcher>> {
    let mut fetchers: Vec<Arc<dyn ProviderFetcher>> = Vec::new();
    if let Some(url) = provider.registry_url() {
        fetchers.push(Arc::new(RegistryFetcher::new(http.clone(), url)));
    }
    if let Some(url) = provider.aggregator_url() {
        fetchers.push(Arc::new(AggregatorFetcher::new(http, url)));
    }
    fetchers
}

/// Parse `{ data: { prefixes: [ { prefix } ] } }`
pub fn parse_registry_payload(body: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct RegistryResponse {
        data: RegistryData,
    }

    #[derive(Deserialize)]
    struct RegistryData {
        #[serde(default)]
        prefixes: Vec<RegistryPrefix>,
    }

    #[derive(Deserialize)]
    struct RegistryPrefix {
        prefix: Option<String>,
    }

    let response: RegistryResponse = serde_json::from_str(body)?;

    Ok(response
        .data
        .prefixes
        .into_iter()
        .filter_map(|p| p.prefix)
        .filter(|p| !p.trim().is_empty())
        .collect())
}

/// Parse `{ data: { ipv4_prefixes: [..], ipv6_prefixes: [..] } }`
///
/// Entries carry `prefix`, `ip`, `cidr` and `routed`. Only the prefix is
/// used; `ip`/`cidr` stand in when `prefix` is missing. The routed flag is
/// ignored.
pub fn parse_aggregator_payload(body: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct AggregatorResponse {
        data: AggregatorData,
    }

    #[derive(Deserialize)]
    struct AggregatorData {
        #[serde(default)]
        ipv4_prefixes: Vec<AggregatorPrefix>,
        #[serde(default)]
        ipv6_prefixes: Vec<AggregatorPrefix>,
    }

    #[derive(Deserialize)]
    struct AggregatorPrefix {
        prefix: Option<String>,
        ip: Option<String>,
        cidr: Option<u8>,
    }

    impl AggregatorPrefix {
        fn into_prefix(self) -> Option<String> {
            match (self.prefix, self.ip, self.cidr) {
                (Some(prefix), _, _) if !prefix.trim().is_empty() => Some(prefix),
                (_, Some(ip), Some(cidr)) => Some(format!("{}/{}", ip, cidr)),
                _ => None,
            }
        }
    }

    let response: AggregatorResponse = serde_json::from_str(body)?;
    let AggregatorData {
        ipv4_prefixes,
        ipv6_prefixes,
    } = response.data;

    Ok(ipv4_prefixes
        .into_iter()
        .chain(ipv6_prefixes)
        .filter_map(AggregatorPrefix::into_prefix)
        .collect())
}
