//! HTTP client for single webhook delivery attempts.
//!
//! Builds the signed POST request for an endpoint, sends it once with a
//! per-attempt timeout and classifies the outcome. Retrying is the caller's
//! job; this client never retries internally.

use std::time::{Duration, Instant};

use bytes::Bytes;
use herald_core::models::{Endpoint, EndpointId, Event, EventId};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::{
    error::{DeliveryError, Result},
    signing::{self, SIGNATURE_HEADER},
};

/// Header carrying the event type name.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Header carrying the event identifier.
pub const EVENT_ID_HEADER: &str = "X-Webhook-Id";

/// Header carrying the 1-based attempt number.
pub const ATTEMPT_HEADER: &str = "X-Webhook-Attempt";

/// Default `User-Agent` sent with every delivery.
pub const DEFAULT_USER_AGENT: &str = "Herald-Webhooks/1.0";

const MAX_RESPONSE_BODY_BYTES: usize = 1024;

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a single HTTP attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow. Unfollowed 3xx responses fail.
    pub max_redirects: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 0,
            verify_tls: true,
        }
    }
}

/// Signed request for one (event, endpoint) pair.
///
/// Built once per pipeline: the body and signature are identical for every
/// attempt, only the attempt number changes.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Event being delivered.
    pub event_id: EventId,
    /// Destination endpoint.
    pub endpoint_id: EndpointId,
    /// Event type name, sent as `X-Webhook-Event`.
    pub event_type: String,
    /// Destination URL.
    pub url: String,
    /// Serialized envelope; exactly the bytes that were signed.
    pub body: Bytes,
    /// Hex HMAC-SHA256 of `body`.
    pub signature: String,
}

impl DeliveryRequest {
    /// Serializes the event envelope and signs it with the endpoint's secret.
    pub fn new(endpoint: &Endpoint, event: &Event) -> Result<Self> {
        let body = event
            .envelope()
            .to_bytes()
            .map_err(|e| DeliveryError::signing(format!("failed to serialize envelope: {e}")))?;

        let signature = signing::sign(&body, endpoint.secret.as_bytes())
            .map_err(|e| DeliveryError::signing(e.to_string()))?;

        Ok(Self {
            event_id: event.id,
            endpoint_id: endpoint.id,
            event_type: event.event_type.clone(),
            url: endpoint.url.clone(),
            body,
            signature,
        })
    }
}

/// Response from a webhook delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated to 1 KiB.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
}

/// Outcome of one HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// Endpoint answered with a 2xx status.
    Success(DeliveryResponse),
    /// Non-2xx status, network error or timeout.
    Failure(DeliveryError),
}

impl AttemptResult {
    /// Returns whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// HTTP client for webhook delivery.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(DeliveryError::configuration("timeout must be greater than 0"));
        }

        let redirect = if config.max_redirects == 0 {
            reqwest::redirect::Policy::none()
        } else {
            reqwest::redirect::Policy::limited(config.max_redirects as usize)
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(redirect)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Performs exactly one delivery attempt.
    ///
    /// A 2xx response is a success; anything else, including transport
    /// errors and timeouts, is a failure.
    pub async fn attempt(&self, request: &DeliveryRequest, attempt_number: u32) -> AttemptResult {
        let span = info_span!(
            "webhook_delivery",
            event_id = %request.event_id,
            endpoint_id = %request.endpoint_id,
            event_type = %request.event_type,
            url = %request.url,
            attempt = attempt_number
        );

        async move {
            match self.send(request, attempt_number).await {
                Ok(response) if (200..=299).contains(&response.status_code) => {
                    tracing::debug!(
                        status = response.status_code,
                        duration_ms = response.duration.as_millis() as u64,
                        "Endpoint accepted delivery"
                    );
                    AttemptResult::Success(response)
                },
                Ok(response) => {
                    tracing::debug!(
                        status = response.status_code,
                        duration_ms = response.duration.as_millis() as u64,
                        "Endpoint rejected delivery"
                    );
                    AttemptResult::Failure(DeliveryError::http_status(
                        response.status_code,
                        response.body,
                    ))
                },
                Err(error) => AttemptResult::Failure(error),
            }
        }
        .instrument(span)
        .await
    }

    async fn send(&self, request: &DeliveryRequest, attempt_number: u32) -> Result<DeliveryResponse> {
        let start_time = Instant::now();

        let response = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &request.signature)
            .header(EVENT_HEADER, &request.event_type)
            .header(EVENT_ID_HEADER, request.event_id.to_string())
            .header(ATTEMPT_HEADER, attempt_number.to_string())
            .body(request.body.clone())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    error = %e,
                    "Request failed"
                );

                if e.is_timeout() {
                    return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                }
                if e.is_connect() {
                    return Err(DeliveryError::network(format!("connection failed: {e}")));
                }
                return Err(DeliveryError::network(e.to_string()));
            },
        };

        Ok(read_response(response, start_time).await)
    }
}

/// Reads status and a truncated body from an HTTP response.
async fn read_response(response: Response, start_time: Instant) -> DeliveryResponse {
    let status_code = response.status().as_u16();

    let body = match response.bytes().await {
        Ok(bytes) => truncate_body(&bytes),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read response body");
            format!("[failed to read response body: {e}]")
        },
    };

    DeliveryResponse { status_code, body, duration: start_time.elapsed() }
}

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_RESPONSE_BODY_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let suffix = "... (truncated)";
    let kept = &bytes[..MAX_RESPONSE_BODY_BYTES - suffix.len()];
    format!("{}{suffix}", String::from_utf8_lossy(kept))
}
