//! Endpoint registration and management handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use herald_core::{CoreError, Endpoint, EndpointId, SigningSecret};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Request body for endpoint registration.
#[derive(Debug, Deserialize)]
pub struct CreateEndpointRequest {
    /// Destination URL
    pub url: String,
    /// Event types to subscribe to; `"*"` subscribes to all
    pub event_types: Vec<String>,
    /// Signing secret; generated when omitted
    #[serde(default)]
    pub secret: Option<String>,
}

/// Request body for activation changes.
#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    /// Whether new events should fan out to the endpoint
    pub active: bool,
}

/// Endpoint as returned by the API.
#[derive(Debug, Serialize)]
pub struct EndpointResponse {
    /// Endpoint ID
    pub id: EndpointId,
    /// Destination URL
    pub url: String,
    /// Subscribed event types
    pub event_types: Vec<String>,
    /// Whether new events fan out to the endpoint
    pub active: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Signing secret; present only in the registration response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl EndpointResponse {
    fn without_secret(endpoint: Endpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            event_types: endpoint.subscribed_events,
            active: endpoint.active,
            created_at: endpoint.created_at,
            secret: None,
        }
    }

    fn with_secret(endpoint: Endpoint) -> Self {
        let secret = endpoint.secret.expose().to_string();
        Self { secret: Some(secret), ..Self::without_secret(endpoint) }
    }
}

/// Result of a test delivery request.
#[derive(Debug, Serialize)]
pub struct TestEndpointResponse {
    /// Whether the test event was queued
    pub queued: bool,
}

/// Registers an endpoint.
///
/// Returns 201 with the endpoint and its secret. The secret is not returned
/// by any other route.
#[instrument(name = "create_endpoint", skip_all)]
pub async fn create_endpoint(
    State(state): State<AppState>,
    payload: Result<Json<CreateEndpointRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EndpointResponse>), ApiError> {
    let Json(request) = payload?;

    let secret = match request.secret {
        Some(raw) => Some(SigningSecret::new(raw).ok_or_else(|| {
            CoreError::invalid_endpoint(&request.url, "secret must not be empty")
        })?),
        None => None,
    };

    let endpoint = state
        .dispatcher
        .registry()
        .register_endpoint(&request.url, request.event_types, secret)
        .await
        .inspect_err(|e| warn!(error = %e, "Endpoint registration rejected"))?;

    Ok((StatusCode::CREATED, Json(EndpointResponse::with_secret(endpoint))))
}

/// Lists endpoints in registration order, without secrets.
pub async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointResponse>> {
    let endpoints = state.dispatcher.registry().list().await;
    Json(endpoints.into_iter().map(EndpointResponse::without_secret).collect())
}

/// Deregisters an endpoint and cancels its pending retries.
#[instrument(name = "delete_endpoint", skip_all)]
pub async fn delete_endpoint(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = EndpointId::from(path?.0);

    if state.dispatcher.deregister_endpoint(id).await {
        info!(endpoint_id = %id, "Endpoint deleted via API");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CoreError::EndpointNotFound { id }.into())
    }
}

/// Enables or disables an endpoint for future events.
pub async fn set_endpoint_active(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SetActiveRequest>, JsonRejection>,
) -> Result<Json<EndpointResponse>, ApiError> {
    let id = EndpointId::from(path?.0);
    let Json(request) = payload?;
    let registry = state.dispatcher.registry();

    if !registry.set_active(id, request.active).await {
        return Err(CoreError::EndpointNotFound { id }.into());
    }

    let endpoint = registry.get(id).await.ok_or(CoreError::EndpointNotFound { id })?;
    Ok(Json(EndpointResponse::without_secret(endpoint)))
}

/// Queues a `webhook.test` delivery to one endpoint.
///
/// 202 when queued, 404 for an unknown endpoint, 503 when the queue rejects
/// the event.
pub async fn test_endpoint(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = EndpointId::from(path?.0);

    if state.dispatcher.registry().get(id).await.is_none() {
        return Ok((StatusCode::NOT_FOUND, Json(TestEndpointResponse { queued: false }))
            .into_response());
    }

    let queued = state.dispatcher.test_endpoint(id).await;
    let status = if queued { StatusCode::ACCEPTED } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok((status, Json(TestEndpointResponse { queued })).into_response())
}
