//! Event publication and delivery record handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use herald_core::{DeliveryRecord, EventId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Request body for event publication.
#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    /// Event type, e.g. `user.registered`
    pub event: String,
    /// Payload delivered as `data`
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Response for an accepted event.
#[derive(Debug, Serialize)]
pub struct PublishEventResponse {
    /// ID assigned to the event; sent as `X-Webhook-Id`
    pub id: EventId,
}

/// Publishes an event to subscribed endpoints.
///
/// Returns 202 once queued. Delivery happens in the background.
#[instrument(name = "publish_event", skip_all)]
pub async fn publish_event(
    State(state): State<AppState>,
    payload: Result<Json<PublishEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublishEventResponse>), ApiError> {
    let Json(request) = payload?;

    let id = state.dispatcher.publish(&request.event, request.data)?;
    debug!(event_id = %id, event_type = %request.event, "Event accepted via API");

    Ok((StatusCode::ACCEPTED, Json(PublishEventResponse { id })))
}

/// Delivery records for one event, one per endpoint it fanned out to.
pub async fn event_deliveries(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<DeliveryRecord>>, ApiError> {
    let event_id = EventId::from(path?.0);
    Ok(Json(state.dispatcher.deliveries(event_id).await))
}
