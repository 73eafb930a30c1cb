//! Error taxonomy for the guardian core.
//!
//! Policy denials (protected namespace, rate limit, approval required) are
//! NOT errors: they are structured outcomes returned to callers. Only
//! genuine failures travel through `GuardianError`.

use thiserror::Error;

/// Errors produced by the guardian core and its adapters.
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("configuration error: {0}")]
    Config(String),

    /// An external dependency (durable store, metrics/log backend, vector
    /// store, analyzer) could not be reached. Callers treat this as degraded
    /// mode, not a fatal condition.
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// The orchestrator API rejected or failed a request.
    #[error("orchestrator API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM backend error: {0}")]
    Llm(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl GuardianError {
    /// Construct an `Unavailable` error for the named dependency.
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// True if this error represents a degraded external dependency rather
    /// than a bug or a hard failure.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

pub type GuardianResult<T> = Result<T, GuardianError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_display() {
        let err = GuardianError::unavailable("redis", "connection refused");
        assert_eq!(err.to_string(), "redis unavailable: connection refused");
        assert!(err.is_degraded());
    }

    #[test]
    fn test_api_error_is_not_degraded() {
        let err = GuardianError::Api {
            status: 404,
            message: "pod not found".into(),
        };
        assert!(!err.is_degraded());
    }
}
