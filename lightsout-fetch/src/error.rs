//! Error types for the lightsout-fetch crate.
//!
//! Messages are stable and short because they are surfaced verbatim to the
//! user as the failure reason of a sync.

/// Errors that can occur while fetching or parsing a knowledge source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection failure, DNS failure, or request timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {reason}")]
    Http {
        /// Numeric status code.
        status: u16,
        /// Canonical reason phrase, or `"unknown"`.
        reason: String,
    },

    /// The body was neither an accepted JSON shape nor usable delimited text.
    #[error("parse error: {0}")]
    Parse(String),

    /// The body was valid JSON but held no knowledge item list.
    #[error("source returned no items")]
    NoItems,

    /// The source URL could not be parsed.
    #[error("invalid source url: {0}")]
    InvalidUrl(String),

    /// Invalid fetcher configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for lightsout-fetch results.
pub type Result<T> = std::result::Result<T, FetchError>;
