//! HTTP request handlers.
//!
//! Handlers are grouped by functionality:
//! - `health` - service status probe
//! - `endpoints` - endpoint registration and management
//! - `events` - event publication and delivery records
//! - `monitoring` - dead letters and dispatcher counters
//!
//! Failures are returned as [`ApiError`](crate::ApiError) with a code from
//! the error taxonomy.

pub mod endpoints;
pub mod events;
pub mod health;
pub mod monitoring;

pub use endpoints::{
    create_endpoint, delete_endpoint, list_endpoints, set_endpoint_active, test_endpoint,
};
pub use events::{event_deliveries, publish_event};
pub use health::health_check;
pub use monitoring::{dispatch_stats, list_dead_letters};
