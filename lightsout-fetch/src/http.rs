//! Shared HTTP client for knowledge-source downloads.

use crate::config::FetchConfig;
use crate::error::FetchError;
use std::time::Duration;

/// User-Agent sent when the config does not override it.
pub fn default_user_agent() -> String {
    format!("lightsout/{}", env!("CARGO_PKG_VERSION"))
}

/// Build a [`reqwest::Client`] configured for knowledge-source requests.
///
/// The client has:
/// - Whole-request timeout from config
/// - Bounded redirect policy
/// - Brotli and gzip decompression
///
/// # Errors
///
/// Returns [`FetchError::Config`] if the client cannot be constructed.
pub fn build_client(config: &FetchConfig) -> Result<reqwest::Client, FetchError> {
    let ua = match config.user_agent {
        Some(ref custom) => custom.clone(),
        None => default_user_agent(),
    };

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))
}

/// Map a transport-level reqwest failure into [`FetchError::Network`].
pub(crate) fn transport_error(err: &reqwest::Error, timeout_seconds: u64) -> FetchError {
    if err.is_timeout() {
        FetchError::Network(format!("request timed out after {timeout_seconds}s"))
    } else {
        FetchError::Network(err.to_string())
    }
}
