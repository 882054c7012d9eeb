//! Error types for the Firebase client.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by custom unmarshallers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for request/response operations and for opening a watch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("permission denied: {message}")]
    Forbidden { message: String },

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("invalid request: {message}")]
    BadRequest { message: String },

    #[error("server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("timeout")]
    Timeout,

    #[error("json error: {0}")]
    Json(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Shape of the error body the server sends with failed requests.
#[derive(serde::Deserialize)]
struct ErrorBody {
    error: String,
}

impl Error {
    /// Create an error from an HTTP status code and the response body.
    ///
    /// The server reports failures as `{"error": "<message>"}`; that message
    /// is kept when present.
    pub fn from_response(status: u16, url: &str, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| default_message(status));

        match status {
            400 => Error::BadRequest { message },
            401 => Error::Unauthorized { message },
            403 => Error::Forbidden { message },
            404 => Error::NotFound {
                url: url.to_string(),
            },
            429 => Error::RateLimited { retry_after: None },
            _ => Error::ServerError { status, message },
        }
    }

    /// Whether this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::ServerError { status, .. } => *status >= 500,
            Error::Network(_) => true,
            Error::Timeout => true,
            _ => false,
        }
    }

    /// Server-requested wait before retrying, from a 429's `Retry-After`.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn with_retry_after(mut self, delay: Option<Duration>) -> Self {
        if let Error::RateLimited { retry_after } = &mut self {
            *retry_after = delay;
        }
        self
    }

    /// HTTP status code if applicable
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::NotFound { .. } => Some(404),
            Error::Unauthorized { .. } => Some(401),
            Error::Forbidden { .. } => Some(403),
            Error::RateLimited { .. } => Some(429),
            Error::BadRequest { .. } => Some(400),
            Error::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn default_message(status: u16) -> String {
    match status {
        400..=499 => format!("Client error {}", status),
        _ if status >= 500 => format!("Server error {}", status),
        _ => format!("Unexpected status {}", status),
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

/// Error that ends a watch stream.
///
/// Delivered at most once, on the last event of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// The server cancelled the watch because read access was revoked.
    #[error("permission denied")]
    PermissionDenied,

    /// The auth token used to open the watch expired or was revoked.
    #[error("auth token revoked")]
    AuthRevoked,

    /// The caller stopped the watch.
    #[error("watch stopped by caller")]
    Cancelled,

    /// Reading from the connection failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Non-fatal error attached to a single `put`/`patch` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The `{"path": ..., "data": ...}` envelope could not be decoded.
    #[error("malformed event envelope: {0}")]
    Envelope(String),

    /// The unmarshaller rejected the event's data.
    #[error("failed to unmarshal event data: {0}")]
    Payload(String),
}
