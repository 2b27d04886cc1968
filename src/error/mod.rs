//! Error types for quotawatch.
//!
//! Uses `thiserror` for structured error types.
//!
//! ## Error Taxonomy
//!
//! Expected provider failures (auth rejected, network unreachable, malformed
//! payload) are never errors here: adapters turn them into unreachable
//! snapshots so callers always see data. Analytics insufficiency is an
//! explicit `Unavailable` result, not an error. What remains in this enum is
//! the genuinely unexpected: storage faults, I/O, broken configuration.

use thiserror::Error;

/// Main error type for quotawatch operations.
#[derive(Error, Debug)]
pub enum QuotaWatchError {
    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file not found at expected path.
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    // ==========================================================================
    // Storage errors
    // ==========================================================================
    /// Snapshot history database failure.
    #[error("history store error: {0}")]
    History(String),

    // ==========================================================================
    // Network errors
    // ==========================================================================
    /// Request timed out after the given number of seconds.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    /// Generic network error.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse a provider response.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    // ==========================================================================
    // Environment errors
    // ==========================================================================
    /// Required CLI tool not found in PATH.
    #[error("CLI tool not found: {name}")]
    CliNotFound { name: String },

    // ==========================================================================
    // I/O and wrappers
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QuotaWatchError {
    /// Whether this error is worth retrying on the next refresh cycle.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::History(_) | Self::Io(_)
        )
    }
}

/// Result type alias for quotawatch operations.
pub type Result<T> = std::result::Result<T, QuotaWatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        assert!(QuotaWatchError::Timeout(10).retryable());
        assert!(QuotaWatchError::Network("refused".into()).retryable());
    }

    #[test]
    fn config_is_not_retryable() {
        assert!(!QuotaWatchError::Config("bad value".into()).retryable());
        assert!(
            !QuotaWatchError::ConfigParse {
                path: "auth.json".into(),
                message: "trailing comma".into(),
            }
            .retryable()
        );
    }

    #[test]
    fn display_includes_context() {
        let err = QuotaWatchError::CliNotFound {
            name: "gh".into(),
        };
        assert!(err.to_string().contains("gh"));
    }
}
