//! HTTP downloader for raw snapshots

use super::endpoints::{endpoint_catalog, Endpoint};
use crate::adapters::raw::RawStore;
use crate::config::IngestConfig;
use crate::domain::{CorridorError, Result};
use chrono::Utc;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::{Duration, Instant};

/// Result of one source download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Downloaded { bytes: u64 },
    /// A snapshot already exists and `force` was not set
    SkippedExisting,
    /// The portal refused access (HTTP 403); any previous snapshot is kept
    SkippedForbidden,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct SourceIngest {
    pub source_id: String,
    pub url: String,
    pub outcome: IngestOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub results: Vec<SourceIngest>,
    pub duration_ms: u64,
}

impl IngestSummary {
    pub fn downloaded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, IngestOutcome::Downloaded { .. }))
            .count()
    }

    pub fn failed(&self) -> Vec<&SourceIngest> {
        self.results
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    IngestOutcome::Failed { .. } | IngestOutcome::SkippedForbidden
                )
            })
            .collect()
    }

    /// Sources whose download failed outright; a 403 skip is not a failure
    pub fn unavailable(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                IngestOutcome::Failed { reason } => Some((r.source_id.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Why a single request failed
#[derive(Debug)]
enum FetchError {
    /// Network errors, timeouts, 429 and 5xx
    Transient(String),
    Forbidden,
    /// Any other non-success status
    Rejected(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transient(reason) | FetchError::Rejected(reason) => f.write_str(reason),
            FetchError::Forbidden => f.write_str("HTTP 403 Forbidden"),
        }
    }
}

/// Downloads every source into the raw store
pub struct RawIngestor {
    client: Client,
    config: IngestConfig,
    store: RawStore,
}

impl RawIngestor {
    /// Builds the HTTP client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TLS backend cannot be initialized.
    pub fn new(config: IngestConfig, store: RawStore) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("corridor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                CorridorError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            store,
        })
    }

    /// Downloads every catalogued source; failures are recorded, not raised
    pub async fn ingest_all(&self, force: bool) -> IngestSummary {
        let started = Instant::now();
        let mut summary = IngestSummary::default();

        for endpoint in endpoint_catalog() {
            let url = endpoint.url(&self.config);
            let outcome = match self.ingest(&endpoint, force).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(source_id = endpoint.source_id, error = %e, "Download failed");
                    IngestOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            summary.results.push(SourceIngest {
                source_id: endpoint.source_id.to_string(),
                url,
                outcome,
            });
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            downloaded = summary.downloaded(),
            failed = summary.failed().len(),
            duration_ms = summary.duration_ms,
            "Ingestion finished"
        );
        summary
    }

    /// Downloads one source
    ///
    /// # Errors
    ///
    /// Returns [`CorridorError::Ingestion`] once retries are exhausted or the
    /// server rejects the request, and an I/O error if the snapshot cannot
    /// be written.
    pub async fn ingest(&self, endpoint: &Endpoint, force: bool) -> Result<IngestOutcome> {
        let format = endpoint.format();
        if !force && self.store.exists(endpoint.source_id, format).await {
            tracing::info!(source_id = endpoint.source_id, "Snapshot exists, skipping download");
            return Ok(IngestOutcome::SkippedExisting);
        }

        let url = endpoint.url(&self.config);
        tracing::info!(source_id = endpoint.source_id, url = %url, "Downloading snapshot");

        let body = match self.retry_request(|| self.fetch(&url)).await {
            Ok(body) => body,
            Err(FetchError::Forbidden) => {
                tracing::warn!(
                    source_id = endpoint.source_id,
                    url = %url,
                    "Access forbidden, skipping source"
                );
                return Ok(IngestOutcome::SkippedForbidden);
            }
            Err(e) => {
                return Err(CorridorError::Ingestion(format!(
                    "{}: {e}",
                    endpoint.source_id
                )))
            }
        };

        self.store
            .write_snapshot(endpoint.source_id, format, &body, &url, Utc::now())
            .await?;

        tracing::info!(
            source_id = endpoint.source_id,
            bytes = body.len(),
            "Snapshot saved"
        );
        Ok(IngestOutcome::Downloaded {
            bytes: body.len() as u64,
        })
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FetchError::Forbidden);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Rejected(format!("HTTP {status}")));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Transient(format!("failed to read body: {e}")))
    }

    /// Retries transient failures with exponential backoff
    async fn retry_request<F, T, Fut>(&self, operation: F) -> std::result::Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, FetchError>>,
    {
        let max_attempts = self.config.retry.max_retries;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(FetchError::Transient(reason)) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(FetchError::Transient(reason));
                    }

                    let delay_ms = self.config.retry.delay_for_attempt(attempt);
                    crate::log_retry_attempt!(attempt, max_attempts, delay_ms, reason);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
