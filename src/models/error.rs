//! Error types for riskmatrix.
//!
//! Taxonomy:
//! - Service failures: the text-generation endpoint was unreachable, empty or refused
//! - Output failures: the model answered but the answer could not be recovered
//! - Caller failures: bad arguments, missing upstream artifacts

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for riskmatrix.
#[derive(Debug, Error)]
pub enum RiskError {
    // ═══════════════════════════════════════════════════════════════════
    // SERVICE: the generation endpoint misbehaved
    // ═══════════════════════════════════════════════════════════════════

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Service returned an empty response")]
    EmptyResponse,

    #[error("Content blocked by service: {reason}")]
    BlockedContent { reason: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    // ═══════════════════════════════════════════════════════════════════
    // OUTPUT: the model answered with something we cannot use
    // ═══════════════════════════════════════════════════════════════════

    #[error("Unparsable response ({reason}): {raw}")]
    UnparsableResponse { reason: String, raw: String },

    // ═══════════════════════════════════════════════════════════════════
    // CALLER: bad input or missing upstream artifacts
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed {context}: {reason}")]
    Malformed { context: String, reason: String },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RiskError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an unparsable-response error keeping the raw text for diagnostics.
    pub fn unparsable(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::UnparsableResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Check if another attempt could succeed.
    ///
    /// Content-policy refusals and caller errors are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable(_)
                | Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::EmptyResponse
                | Self::UnparsableResponse { .. }
        ) || matches!(self, Self::Api { status, .. } if *status >= 500)
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RiskError {
    fn from(e: reqwest::Error) -> Self {
        Self::ServiceUnavailable(e.to_string())
    }
}

/// Result type alias for riskmatrix.
pub type Result<T> = std::result::Result<T, RiskError>;
