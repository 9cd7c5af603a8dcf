//! Error types for webhook delivery operations.
//!
//! Per-attempt failures (network errors, timeouts, non-2xx responses) are
//! recovered by the retry scheduler and never reach producers. The remaining
//! variants describe misconfiguration and state machine misuse.

use std::fmt;

use thiserror::Error;

use crate::retry::DeliveryState;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for webhook delivery operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// Endpoint answered with a status outside 200-299.
    #[error("unexpected response: HTTP {status_code}")]
    HttpStatus {
        /// HTTP status code
        status_code: u16,
        /// Response body content, truncated
        body: String,
    },

    /// Payload could not be serialized or signed.
    #[error("signing failed: {message}")]
    SigningError {
        /// Signing error message
        message: String,
    },

    /// Invalid client or policy configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// Retry state machine received an operation its state does not allow.
    #[error("invalid delivery transition from {from} on {operation}")]
    InvalidTransition {
        /// State the schedule was in
        from: DeliveryState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// All delivery attempts exhausted.
    #[error("delivery failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
    },

    /// Unexpected internal error.
    #[error("internal delivery error: {message}")]
    InternalError {
        /// Internal error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an error from a non-2xx HTTP response.
    pub fn http_status(status_code: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus { status_code, body: body.into() }
    }

    /// Creates a signing error.
    pub fn signing(message: impl Into<String>) -> Self {
        Self::SigningError { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates a retries exhausted error.
    pub fn retries_exhausted(attempts: u32) -> Self {
        Self::RetriesExhausted { attempts }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Determines if this error is an attempt failure the scheduler retries.
    ///
    /// Every transport or HTTP failure is retried, including 4xx responses;
    /// the attempt budget bounds the work instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. } | Self::Timeout { .. } | Self::HttpStatus { .. } => true,

            Self::SigningError { .. }
            | Self::ConfigurationError { .. }
            | Self::InvalidTransition { .. }
            | Self::RetriesExhausted { .. }
            | Self::InternalError { .. } => false,
        }
    }

    /// Returns the HTTP status code when the endpoint responded.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Category of delivery error for logs and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connectivity issues and timeouts.
    Network,
    /// HTTP client errors (4xx).
    Client,
    /// HTTP server errors (5xx).
    Server,
    /// Other non-2xx responses, e.g. unfollowed redirects.
    Http,
    /// Configuration problems.
    Configuration,
    /// Internal system errors.
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::HttpStatus { status_code, .. } => match status_code {
                400..=499 => Self::Client,
                500..=599 => Self::Server,
                _ => Self::Http,
            },
            DeliveryError::ConfigurationError { .. } => Self::Configuration,
            DeliveryError::SigningError { .. }
            | DeliveryError::InvalidTransition { .. }
            | DeliveryError::RetriesExhausted { .. }
            | DeliveryError::InternalError { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::Http => write!(f, "http"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
