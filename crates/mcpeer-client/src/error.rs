//! Error types for the client library.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error body returned by OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// The error detail object from the API.
    pub error: ErrorDetail,
}

/// Detailed error information from the API.
#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    /// The error message text describing what went wrong.
    pub message: String,
}

/// Errors that can occur when talking to a language model API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP request failure.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Failure inside the retry middleware stack.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// SSE event source error.
    #[error("EventSource error: {0}")]
    EventSourceError(#[from] reqwest_eventsource::Error),

    /// API authentication failure (HTTP 401).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        /// Message returned by the API.
        message: String,
        /// Suggested wait time before retrying, if provided by the API.
        retry_after: Option<Duration>,
    },

    /// Client configuration issue.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The request is malformed or failed validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The API returned data that doesn't match the expected format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other non-success response.
    #[error("Request failed with status {status}: {message}")]
    RequestError {
        /// HTTP status code.
        status: u16,
        /// Message returned by the API.
        message: String,
    },

    /// Tools requested but not supported by this client.
    #[error("Tool calling not supported")]
    ToolsNotSupported,

    /// Streaming requested but not supported by this client.
    #[error("Streaming not supported")]
    StreamingNotSupported,

    /// API service unavailable (5xx).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ClientError {
    /// Maps a non-success HTTP status and its message to an error.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::AuthenticationError(message),
            429 => Self::RateLimitError {
                message,
                retry_after: None,
            },
            500..=599 => Self::ServiceUnavailable(message),
            _ => Self::RequestError { status, message },
        }
    }

    /// Check if this error is potentially retryable.
    ///
    /// Returns `true` for network errors, rate limits and service unavailable errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_)
                | Self::MiddlewareError(_)
                | Self::RateLimitError { .. }
                | Self::ServiceUnavailable(_)
        )
    }

    /// Check if this is an authentication error.
    #[must_use]
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
    }

    /// Get the retry-after duration if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
