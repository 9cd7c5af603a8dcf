//! Dead letter and counter handlers.

use axum::{extract::State, Json};
use herald_core::DeadLetter;
use herald_delivery::DispatchStats;

use crate::AppState;

/// Permanently failed deliveries, oldest first.
pub async fn list_dead_letters(State(state): State<AppState>) -> Json<Vec<DeadLetter>> {
    Json(state.dispatcher.dead_letters().await)
}

/// Dispatcher counters.
pub async fn dispatch_stats(State(state): State<AppState>) -> Json<DispatchStats> {
    Json(state.dispatcher.stats().await)
}
