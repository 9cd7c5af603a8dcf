//! Webhook delivery engine.
//!
//! Producers publish events to a [`Dispatcher`] and return immediately. A
//! single consumer task drains the bounded queue and fans each event out to
//! every active endpoint subscribed to its type. Every (event, endpoint) pair
//! runs in its own pipeline:
//!
//! 1. **Sign** - serialize the envelope once and HMAC-SHA256 it with the
//!    endpoint secret
//! 2. **Attempt** - POST with a per-attempt timeout; 2xx is success
//! 3. **Back off** - wait 1s, 2s, 4s between attempts, on the injected clock
//! 4. **Dead-letter** - record the failure after the last attempt
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use herald_core::RealClock;
//! use herald_delivery::{Dispatcher, DispatcherConfig, EndpointRegistry};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(RealClock::new());
//! let registry = Arc::new(EndpointRegistry::new(clock.clone()));
//! let dispatcher = Dispatcher::new(DispatcherConfig::default(), registry, clock)?;
//! dispatcher.start().await?;
//!
//! dispatcher
//!     .register_endpoint("https://example.com/hooks", vec!["user.registered".into()], None)
//!     .await?;
//! dispatcher.publish("user.registered", json!({"user_id": 42}))?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dead_letter;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod signing;
pub mod tracker;

pub use client::{ClientConfig, DeliveryClient, DeliveryRequest};
pub use dead_letter::DeadLetterQueue;
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use registry::EndpointRegistry;
pub use retry::{BackoffStrategy, DeliveryState, RetryPolicy, RetrySchedule};
pub use tracker::DeliveryTracker;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
