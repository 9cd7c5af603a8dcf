//! Error types and result handling for producer-facing operations.
//!
//! Covers the failures a caller can observe synchronously: invalid endpoint
//! registrations, malformed event types and a saturated or closed delivery
//! queue. Per-attempt delivery failures live in `herald-delivery` and never
//! surface to producers.

use thiserror::Error;

use crate::models::EndpointId;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors returned to producers and operators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // Registration Errors (E1001-E1003)
    /// Endpoint registration rejected (E1001).
    #[error("[E1001] Invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint {
        /// URL supplied at registration
        url: String,
        /// Why the registration was rejected
        reason: String,
    },

    /// Event type name is malformed (E1002).
    #[error("[E1002] Invalid event type {event_type:?}: {reason}")]
    InvalidEventType {
        /// Offending event type
        event_type: String,
        /// Why the name was rejected
        reason: String,
    },

    /// Endpoint does not exist (E1003).
    #[error("[E1003] Endpoint {id} not found")]
    EndpointNotFound {
        /// The endpoint ID that was not found
        id: EndpointId,
    },

    // Queue Errors (E3001-E3002)
    /// Bounded delivery queue at capacity (E3001).
    #[error("[E3001] Queue full: {capacity} events pending")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// Dispatcher no longer accepts events (E3002).
    #[error("[E3002] Queue closed: dispatcher is shutting down")]
    QueueClosed,
}

impl CoreError {
    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint { url: url.into(), reason: reason.into() }
    }

    /// Creates an invalid event type error.
    pub fn invalid_event_type(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEventType { event_type: event_type.into(), reason: reason.into() }
    }

    /// Returns the error code (E1001-E3002).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint { .. } => "E1001",
            Self::InvalidEventType { .. } => "E1002",
            Self::EndpointNotFound { .. } => "E1003",
            Self::QueueFull { .. } => "E3001",
            Self::QueueClosed => "E3002",
        }
    }

    /// Returns whether the caller may succeed by trying again later.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }
}
