//! Error types for Evermind

use thiserror::Error;

/// Result type alias using Evermind's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Evermind
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding/LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Provider(_)
                | Error::RateLimit(_)
                | Error::Timeout(_)
                | Error::Database(_)
        )
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::Provider("connection reset".into()).is_retryable());
        assert!(Error::Timeout("embedding call".into()).is_retryable());
        assert!(!Error::InvalidInput("text too long".into()).is_retryable());

        assert!(Error::InvalidInput("bad owner id".into()).is_client_error());
        assert!(Error::NotFound("fragment".into()).is_client_error());
        assert!(!Error::Internal("oops".into()).is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Provider("503 from embeddings endpoint".into());
        assert_eq!(err.to_string(), "Provider error: 503 from embeddings endpoint");

        let err = Error::InvalidInput("fragment text exceeds 2000 characters".into());
        assert!(err.to_string().starts_with("Invalid input:"));
    }
}
