//! Error types for the lightsout engine.

use lightsout_fetch::FetchError;

/// Top-level error type for scheduling, syncing, and persistence.
#[derive(Debug, thiserror::Error)]
pub enum LightsOutError {
    /// Connection failure or timeout while talking to a knowledge source.
    #[error("network error: {0}")]
    Network(String),

    /// A knowledge source answered with a non-success status.
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    /// A knowledge source URL could not be parsed.
    #[error("invalid source url: {0}")]
    InvalidSource(String),

    /// A knowledge source payload could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// A knowledge source yielded zero items.
    #[error("source returned no items")]
    NoData,

    /// Config document read/write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration or settings.
    #[error("config error: {0}")]
    Config(String),

    /// Platform shutdown command failure.
    #[error("shutdown error: {0}")]
    Shutdown(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for LightsOutError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(msg) => Self::Network(msg),
            FetchError::Http { status, reason } => Self::Http { status, reason },
            FetchError::Parse(msg) => Self::Parse(msg),
            FetchError::NoItems => Self::NoData,
            FetchError::InvalidUrl(msg) => Self::InvalidSource(msg),
            FetchError::Config(msg) => Self::Config(msg),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LightsOutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_map_onto_taxonomy() {
        assert!(matches!(
            LightsOutError::from(FetchError::Network("down".into())),
            LightsOutError::Network(_)
        ));
        let http = LightsOutError::from(FetchError::Http {
            status: 503,
            reason: "Service Unavailable".into(),
        });
        assert_eq!(http.to_string(), "HTTP 503: Service Unavailable");
        assert!(matches!(
            LightsOutError::from(FetchError::NoItems),
            LightsOutError::NoData
        ));
        assert!(matches!(
            LightsOutError::from(FetchError::Parse("x".into())),
            LightsOutError::Parse(_)
        ));
    }

    #[test]
    fn converted_messages_match_the_fetcher() {
        let cases = [
            FetchError::Network("timed out".into()),
            FetchError::Http {
                status: 404,
                reason: "Not Found".into(),
            },
            FetchError::Parse("bad line".into()),
            FetchError::NoItems,
            FetchError::InvalidUrl("nope".into()),
            FetchError::Config("timeout".into()),
        ];
        for err in cases {
            let expected = err.to_string();
            assert_eq!(LightsOutError::from(err).to_string(), expected);
        }
    }
}
