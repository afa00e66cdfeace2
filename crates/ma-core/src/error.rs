//! Error types for ma-core

use thiserror::Error;

/// Main error type for ma-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Text generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single text-generation attempt or of a whole strategy.
///
/// Backends return these; the retrying summarizer turns them into
/// retries, demotions or a terminal sentinel string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The request never produced an HTTP response (connect, timeout, TLS).
    #[error("transport failure: {0}")]
    Transport(String),

    /// HTTP 503, the model is loading or overloaded.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// Any other non-success HTTP status.
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// A 2xx response whose body did not have the expected shape.
    #[error("invalid response format: {0}")]
    InvalidResponse(String),

    #[error("no content to process")]
    EmptyInput,

    #[error("content too short ({0} chars)")]
    InputTooShort(usize),

    /// Every prompt or every backend failed.
    #[error("all generation attempts failed")]
    AllFailed,

    #[error("no text-generation backends configured")]
    NoBackends,
}

impl GenerationError {
    /// Build from a reqwest error raised before a response was received.
    pub fn transport(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }

    /// Map a non-success HTTP status into the matching variant.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        if status == 503 {
            Self::ServiceUnavailable
        } else {
            Self::Status {
                status,
                body: body.into(),
            }
        }
    }
}

/// Result type alias for ma-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_503() {
        assert_eq!(
            GenerationError::from_status(503, "loading"),
            GenerationError::ServiceUnavailable
        );
    }

    #[test]
    fn test_from_status_keeps_body() {
        let err = GenerationError::from_status(400, "bad input");
        assert_eq!(
            err,
            GenerationError::Status {
                status: 400,
                body: "bad input".to_string()
            }
        );
        assert_eq!(err.to_string(), "API error 400: bad input");
    }
}
