//! Fetcher configuration.
//!
//! The 30 second request timeout is part of the external contract with
//! knowledge-source hosts; change it only in tests.

use crate::error::FetchError;

/// Request timeout every knowledge source is held to.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`HttpFetcher`](crate::HttpFetcher).
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whole-request timeout in seconds (connect + headers + body).
    pub timeout_seconds: u64,
    /// Maximum number of redirects followed before giving up.
    pub max_redirects: usize,
    /// Custom User-Agent. `None` sends `lightsout/<version>`.
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            max_redirects: 10,
            user_agent: None,
        }
    }
}

impl FetchConfig {
    /// Validates this configuration.
    ///
    /// `timeout_seconds` must be greater than 0.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.timeout_seconds == 0 {
            return Err(FetchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
