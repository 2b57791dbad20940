//! Error types for the HubSpot adapter.
//!
//! # Design
//! `NotFound` gets a dedicated variant because the resolver treats "the
//! record does not exist" as an empty result rather than a failure. All other
//! non-2xx responses land in `Http` with the status code and the body (or the
//! body's `message` field) for debugging. Query paths convert every variant
//! into an empty list at the outermost boundary; mutation paths convert them
//! into `MutationResult::Error`.

use std::time::Duration;

/// Errors produced while talking to the CRM or validating input.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    /// Adapter configuration is unusable (missing access token). Raised
    /// before any network call.
    #[error("{0}")]
    Configuration(String),

    /// The transport could not complete the round-trip.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The request exceeded the configured timeout and was aborted.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Caller input failed validation before any network call.
    #[error("{0}")]
    Validation(String),

    /// A secondary association call failed after the primary write.
    #[error("association {from} -> {to} failed: {message}")]
    Association {
        from: String,
        to: String,
        message: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Failure reported by a `Transport` implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport's own timeout fired.
    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::TimedOut(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
