//! Delivery lifecycle events and handler traits.
//!
//! Delivery pipelines report every attempt and every terminal outcome as a
//! [`DeliveryEvent`]. Observers such as metrics exporters, audit logs or tests
//! implement [`EventHandler`] and are plugged in without the dispatcher knowing
//! about them.
//!
//! ```text
//!  ┌─────────────────┐  AttemptStarted   ┌────────────────────┐
//!  │ Delivery        │  Succeeded        │ MulticastHandler   │
//!  │ pipeline        │ ────────────────▶ │                    │
//!  └─────────────────┘  Failed / ...     └────────────────────┘
//!                                                  │
//!                                     ┌────────────┴───────────┐
//!                                     ▼                        ▼
//!                               metrics, audit           test recorders
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeadLetter, EndpointId, EventId};

/// Events emitted by delivery pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// An HTTP attempt is about to be sent.
    AttemptStarted(DeliveryAttemptStartedEvent),

    /// An attempt received a 2xx response.
    Succeeded(DeliverySucceededEvent),

    /// An attempt failed.
    Failed(DeliveryFailedEvent),

    /// Every allowed attempt failed.
    DeadLettered(DeadLetter),

    /// Retries stopped before exhaustion.
    Cancelled(DeliveryCancelledEvent),
}

impl DeliveryEvent {
    /// Event the delivery belongs to.
    pub fn event_id(&self) -> EventId {
        match self {
            Self::AttemptStarted(e) => e.event_id,
            Self::Succeeded(e) => e.event_id,
            Self::Failed(e) => e.event_id,
            Self::DeadLettered(e) => e.event_id,
            Self::Cancelled(e) => e.event_id,
        }
    }

    /// Endpoint the delivery targets.
    pub fn endpoint_id(&self) -> EndpointId {
        match self {
            Self::AttemptStarted(e) => e.endpoint_id,
            Self::Succeeded(e) => e.endpoint_id,
            Self::Failed(e) => e.endpoint_id,
            Self::DeadLettered(e) => e.endpoint_id,
            Self::Cancelled(e) => e.endpoint_id,
        }
    }
}

/// Emitted before each HTTP attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttemptStartedEvent {
    /// Event being delivered.
    pub event_id: EventId,

    /// Destination endpoint.
    pub endpoint_id: EndpointId,

    /// URL the attempt is sent to.
    pub endpoint_url: String,

    /// Event type name.
    pub event_type: String,

    /// Attempt number (1-based).
    pub attempt_number: u32,

    /// When the attempt started.
    pub started_at: DateTime<Utc>,
}

/// Emitted when an endpoint acknowledges a delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySucceededEvent {
    /// Event that was delivered.
    pub event_id: EventId,

    /// Endpoint that accepted it.
    pub endpoint_id: EndpointId,

    /// URL of the endpoint.
    pub endpoint_url: String,

    /// Event type name.
    pub event_type: String,

    /// HTTP status code returned by the endpoint.
    pub response_status: u16,

    /// Attempt that succeeded (1-based).
    pub attempt_number: u32,

    /// Round-trip duration of the successful attempt.
    pub duration_ms: u64,

    /// When the delivery completed.
    pub delivered_at: DateTime<Utc>,
}

/// Emitted when a single attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailedEvent {
    /// Event that failed to deliver.
    pub event_id: EventId,

    /// Endpoint that was attempted.
    pub endpoint_id: EndpointId,

    /// URL of the endpoint.
    pub endpoint_url: String,

    /// Event type name.
    pub event_type: String,

    /// HTTP status code if the endpoint responded.
    pub response_status: Option<u16>,

    /// Attempt that failed (1-based).
    pub attempt_number: u32,

    /// Error that caused the failure.
    pub error_message: String,

    /// Whether another attempt is scheduled.
    pub will_retry: bool,

    /// Backoff before the next attempt, when one is scheduled.
    pub next_attempt_in_ms: Option<u64>,

    /// When the failure occurred.
    pub failed_at: DateTime<Utc>,
}

/// Emitted when a delivery stops without success or exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryCancelledEvent {
    /// Event whose delivery was cancelled.
    pub event_id: EventId,

    /// Endpoint that will receive no further attempts.
    pub endpoint_id: EndpointId,

    /// Attempts made before cancellation.
    pub attempt_count: u32,

    /// Why the delivery was cancelled.
    pub reason: String,

    /// When the delivery was cancelled.
    pub cancelled_at: DateTime<Utc>,
}

/// Trait for handling delivery events.
///
/// Implementations must not block delivery processing. Failures inside a
/// handler should be logged and swallowed, never propagated back.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a delivery event.
    async fn handle_event(&self, event: DeliveryEvent);
}

/// No-op event handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DeliveryEvent) {}
}

/// Forwards events to multiple subscribers concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a new multicast handler with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber to receive delivery events.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}
