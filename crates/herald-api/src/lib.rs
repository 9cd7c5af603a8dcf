//! Herald HTTP API.
//!
//! Operator-facing surface over a running [`Dispatcher`]: endpoint
//! management, event publication and delivery inspection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{sync::Arc, time::Duration};

use herald_core::Clock;
use herald_delivery::Dispatcher;

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use error::ApiError;
pub use server::{create_router, serve, start_server};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Dispatcher serving publishes and inspection queries.
    pub dispatcher: Arc<Dispatcher>,
    /// Clock used for response timestamps.
    pub clock: Arc<dyn Clock>,
    /// Upper bound for handling one request.
    pub request_timeout: Duration,
}

impl AppState {
    /// Creates state with the default 30s request timeout.
    pub fn new(dispatcher: Arc<Dispatcher>, clock: Arc<dyn Clock>) -> Self {
        Self { dispatcher, clock, request_timeout: Duration::from_secs(30) }
    }

    /// Overrides the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
