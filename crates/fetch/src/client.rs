//! HTTP retrieval from configured sources.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use kasane_core::model::{CatalogEntry, FetchKind, Source};

use crate::normalize::normalize_catalog;

/// Errors that can occur while fetching a source. These never cross the
/// pipeline boundary — [`SourceClient::fetch_catalog`] converts them into
/// a logged empty result.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("fetch kind not supported in-process: {0}")]
    Unsupported(String),
}

/// Result of a connectivity probe against a single source. Persists nothing.
#[derive(Debug, Serialize)]
pub struct SourceProbe {
    pub ok: bool,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    /// Up to three normalized entries from the live response.
    pub sample: Vec<CatalogEntry>,
    pub entry_count: usize,
    pub error: Option<String>,
}

/// Abstraction over catalog retrieval so the orchestrator can be tested
/// with a scripted fetcher.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Retrieve and normalize a source's catalog. Never errors: failures
    /// are logged and yield an empty list.
    async fn fetch_catalog(&self, source: &Source) -> Vec<CatalogEntry>;
}

/// HTTP client shared across all sources (connection pooling). Each
/// request carries the source's API key and custom headers.
pub struct SourceClient {
    client: reqwest::Client,
}

impl SourceClient {
    /// Build a client with a hard total-request timeout.
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_raw(&self, source: &Source) -> Result<Vec<CatalogEntry>, FetchError> {
        if source.fetch_kind == FetchKind::Scraping {
            return Err(FetchError::Unsupported("scraping".to_string()));
        }

        let mut request = self.client.get(&source.base_url);
        if let Some(api_key) = &source.config.api_key {
            request = request.header("X-Api-Key", api_key);
        }
        for (name, value) in &source.config.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(normalize_catalog(&body, source))
    }

    /// Connectivity probe: one live request, up to three sample entries,
    /// nothing persisted.
    pub async fn test_source(&self, source: &Source) -> SourceProbe {
        let start = Instant::now();
        match self.fetch_raw(source).await {
            Ok(entries) => {
                let entry_count = entries.len();
                SourceProbe {
                    ok: true,
                    http_status: Some(200),
                    latency_ms: start.elapsed().as_millis() as u64,
                    sample: entries.into_iter().take(3).collect(),
                    entry_count,
                    error: None,
                }
            }
            Err(e) => {
                let http_status = match &e {
                    FetchError::Status(code) => Some(*code),
                    _ => None,
                };
                SourceProbe {
                    ok: false,
                    http_status,
                    latency_ms: start.elapsed().as_millis() as u64,
                    sample: Vec::new(),
                    entry_count: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl CatalogFetcher for SourceClient {
    async fn fetch_catalog(&self, source: &Source) -> Vec<CatalogEntry> {
        match self.fetch_raw(source).await {
            Ok(entries) => {
                debug!(
                    source = %source.name,
                    entries = entries.len(),
                    "catalog fetched"
                );
                entries
            }
            Err(e) => {
                warn!(
                    source = %source.name,
                    source_id = %source.id,
                    error = %e,
                    "catalog fetch failed — source contributes no entries this run"
                );
                Vec::new()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kasane_core::model::SourceSettings;
    use uuid::Uuid;

    fn scraping_source() -> Source {
        Source {
            id: Uuid::new_v4(),
            name: "html-only".to_string(),
            base_url: "https://example.org".to_string(),
            fetch_kind: FetchKind::Scraping,
            active: true,
            config: SourceSettings::default(),
            last_sync_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn scraping_source_yields_empty_not_error() {
        let client = SourceClient::new(30).unwrap();
        let entries = client.fetch_catalog(&scraping_source()).await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn probe_reports_unsupported_scraping() {
        let client = SourceClient::new(30).unwrap();
        let probe = client.test_source(&scraping_source()).await;
        assert!(!probe.ok);
        assert!(probe.error.unwrap().contains("not supported"));
        assert!(probe.sample.is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_yields_empty() {
        // Reserved TLD — guaranteed to fail fast without touching a real host.
        let mut source = scraping_source();
        source.fetch_kind = FetchKind::Api;
        source.base_url = "http://unreachable.invalid/catalog".to_string();

        let client = SourceClient::new(2).unwrap();
        let entries = client.fetch_catalog(&source).await;
        assert!(entries.is_empty());
    }
}
