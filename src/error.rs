//! Error types for the matchmaking core
//!
//! Expected outcomes (no host found, host init refused, silent registry) are
//! not errors here; they surface as `Option`/`bool` results. This module
//! covers the internal failures that can still happen around them.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Host initialization failed: {reason}")]
    HostInitFailed { reason: String },

    #[error("Malformed host record: {identity:?} ({reason})")]
    MalformedHostRecord { identity: String, reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Metrics error: {message}")]
    MetricsError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Shorthand for a poisoned-lock failure on the named resource
    pub fn lock_poisoned(resource: &str) -> Self {
        Self::InternalError {
            message: format!("Failed to acquire {} lock", resource),
        }
    }
}

/// Failure reported by the session backend when it cannot start hosting
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("backend refused to host: {reason}")]
    Refused { reason: String },
}

impl From<ConnectionError> for MatchmakingError {
    fn from(err: ConnectionError) -> Self {
        MatchmakingError::HostInitFailed {
            reason: err.to_string(),
        }
    }
}
