//! # lightsout-fetch
//!
//! Retrieves one remote knowledge source over HTTP(S) and normalizes its
//! payload into [`FetchedItem`]s.
//!
//! ## Design
//!
//! - Plain GET, no authentication, fixed 30 second timeout
//! - JSON first (bare array or `knowledgeBase` wrapper), delimited text second
//! - Malformed entries are dropped, never fatal
//! - Source order preserved, no deduplication at this stage

pub mod config;
pub mod error;
pub mod http;
pub mod parse;
pub mod types;

pub use config::FetchConfig;
pub use error::{FetchError, Result};
pub use parse::parse_payload;
pub use types::{FetchedItem, SourceRequest};

/// HTTP fetcher for knowledge sources.
///
/// Holds one pooled [`reqwest::Client`]; cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build a fetcher from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] if the config is invalid or the client
    /// cannot be built.
    pub fn new(config: FetchConfig) -> Result<Self> {
        config.validate()?;
        let client = http::build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Fetcher with the default 30 second timeout.
    ///
    /// # Errors
    ///
    /// Same as [`HttpFetcher::new`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(FetchConfig::default())
    }

    /// Download and parse one source.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] when `source.url` is not an absolute URL
    /// - [`FetchError::Network`] on connection failure or timeout
    /// - [`FetchError::Http`] on a non-success status
    /// - [`FetchError::NoItems`] / [`FetchError::Parse`] per [`parse_payload`]
    pub async fn fetch(&self, source: &SourceRequest) -> Result<Vec<FetchedItem>> {
        let url = url::Url::parse(&source.url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", source.url)))?;

        tracing::debug!(source = %source.name, %url, "fetching knowledge source");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| http::transport_error(&e, self.config.timeout_seconds))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_owned(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| http::transport_error(&e, self.config.timeout_seconds))?;

        let items = parse_payload(&body)?;
        tracing::debug!(source = %source.name, count = items.len(), "parsed knowledge source");
        Ok(items)
    }
}
