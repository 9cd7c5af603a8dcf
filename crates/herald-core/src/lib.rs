//! Core domain models and event types.
//!
//! Provides the strongly-typed primitives shared by the delivery engine and
//! the HTTP API: endpoint and event models, the wire envelope, delivery
//! records, the injectable clock and the delivery lifecycle events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{
    DeliveryAttemptStartedEvent, DeliveryCancelledEvent, DeliveryEvent, DeliveryFailedEvent,
    DeliverySucceededEvent, EventHandler, MulticastEventHandler, NoOpEventHandler,
};
pub use models::{
    event_types, DeadLetter, DeliveryRecord, DeliveryStatus, Endpoint, EndpointId, Envelope,
    Event, EventId, SigningSecret,
};
pub use time::{Clock, RealClock, TestClock};
