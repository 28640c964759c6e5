//! HTTP adapter error types.

use meross_bridge_domain::error::TransportError;

/// Errors specific to the local HTTP transport.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// The request failed (connect, timeout, non-success status, body read).
    #[error("HTTP request failed")]
    Request(#[source] reqwest::Error),

    /// The response body is not a valid envelope.
    #[error("failed to parse device response")]
    Decode(#[source] serde_json::Error),
}

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(inner) if inner.is_timeout() => Self::TimedOut,
            HttpError::Request(inner) if inner.is_connect() => Self::Unreachable(Box::new(inner)),
            HttpError::Decode(inner) => Self::Decode(inner),
            other => Self::Other(Box::new(other)),
        }
    }
}
