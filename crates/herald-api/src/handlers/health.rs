//! Health check handler for service monitoring.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use herald_core::Clock;
use serde::Serialize;
use tracing::debug;

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// When the check ran
    pub timestamp: DateTime<Utc>,
    /// Events waiting in the delivery queue
    pub queue_depth: usize,
    /// Queue capacity
    pub queue_capacity: usize,
    /// Registered endpoints
    pub endpoints: usize,
    /// Service version
    pub version: String,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting and delivering events
    Healthy,
    /// Queue is full; publishes are being rejected
    Degraded,
    /// Dispatcher is shutting down
    Unhealthy,
}

/// Reports queue pressure and endpoint count.
///
/// Returns 503 once the dispatcher no longer accepts events.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let dispatcher = &state.dispatcher;
    let queue_depth = dispatcher.queue_depth();
    let queue_capacity = dispatcher.queue_capacity();

    let status = if !dispatcher.is_accepting() {
        HealthStatus::Unhealthy
    } else if queue_depth >= queue_capacity {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    debug!(?status, queue_depth, "Health check");

    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };

    (
        code,
        Json(HealthResponse {
            status,
            timestamp: state.clock.now_utc(),
            queue_depth,
            queue_capacity,
            endpoints: dispatcher.registry().len().await,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
