//! HTTP mocking utilities for webhook receivers.
//!
//! Wraps a `wiremock` server and exposes received deliveries as typed
//! [`WebhookRequest`] views.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use herald_delivery::{
    client::{ATTEMPT_HEADER, EVENT_HEADER, EVENT_ID_HEADER},
    signing::{self, SIGNATURE_HEADER},
};
use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer as WiremockServer, ResponseTemplate,
};

/// Default path receivers are mounted on.
pub const DEFAULT_HOOK_PATH: &str = "/hooks";

/// HTTP mock server standing in for a webhook receiver.
pub struct MockServer {
    server: WiremockServer,
}

impl MockServer {
    /// Starts a new mock server on a random port.
    pub async fn start() -> Self {
        Self { server: WiremockServer::start().await }
    }

    /// Base URL of the server.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// URL of `path` on this server.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Answers every POST to `path` with `status`.
    pub async fn respond_with_status(&self, hook_path: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(hook_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers successive POSTs to `path` with `statuses`, one each.
    ///
    /// Requests beyond the sequence get wiremock's default 404.
    pub async fn respond_with_sequence(&self, hook_path: &str, statuses: &[u16]) {
        for &status in statuses {
            Mock::given(method("POST"))
                .and(path(hook_path))
                .respond_with(ResponseTemplate::new(status))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
    }

    /// Answers the next POST to `path` with `status` after `delay`.
    ///
    /// Mounted ahead of later mocks, so a slow first response can be followed
    /// by `respond_with_status` for the retries.
    pub async fn respond_with_delay(&self, hook_path: &str, status: u16, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(hook_path))
            .respond_with(ResponseTemplate::new(status).set_delay(delay))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// All requests received so far, oldest first.
    pub async fn received_requests(&self) -> Vec<WebhookRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(WebhookRequest::from)
            .collect()
    }

    /// Requests received on one path.
    pub async fn requests_to(&self, hook_path: &str) -> Vec<WebhookRequest> {
        self.received_requests().await.into_iter().filter(|r| r.path == hook_path).collect()
    }

    /// Polls until at least `count` requests arrived or `timeout` elapses.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> Vec<WebhookRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let requests = self.received_requests().await;
            if requests.len() >= count || tokio::time::Instant::now() >= deadline {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await.len();
        assert_eq!(received, expected, "expected {expected} requests, received {received}");
    }
}

/// A delivery as seen by the receiver.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Headers keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Bytes,
}

impl WebhookRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// `X-Webhook-Signature` value.
    pub fn signature(&self) -> Option<&str> {
        self.header(SIGNATURE_HEADER)
    }

    /// `X-Webhook-Event` value.
    pub fn event_type(&self) -> Option<&str> {
        self.header(EVENT_HEADER)
    }

    /// `X-Webhook-Id` value.
    pub fn event_id(&self) -> Option<&str> {
        self.header(EVENT_ID_HEADER)
    }

    /// `X-Webhook-Attempt` value.
    pub fn attempt(&self) -> Option<u32> {
        self.header(ATTEMPT_HEADER).and_then(|v| v.parse().ok())
    }

    /// Body parsed as the JSON envelope.
    pub fn envelope(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }

    /// Returns whether the signature header matches the body under `secret`.
    pub fn verify_signature(&self, secret: &str) -> bool {
        self.signature()
            .and_then(|sig| signing::verify(&self.body, sig, secret.as_bytes()).ok())
            .unwrap_or(false)
    }
}

impl From<&wiremock::Request> for WebhookRequest {
    fn from(request: &wiremock::Request) -> Self {
        let headers = request
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        Self {
            method: request.method.to_string(),
            path: request.url.path().to_string(),
            headers,
            body: Bytes::from(request.body.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use herald_core::{Clock, Endpoint, Event, RealClock};
    use herald_delivery::{client::AttemptResult, DeliveryClient, DeliveryRequest};
    use serde_json::json;

    use super::*;

    async fn post_three_times(server: &MockServer) -> Vec<u16> {
        let now = RealClock::new().now_utc();
        let endpoint =
            Endpoint::new(&server.endpoint_url(DEFAULT_HOOK_PATH), vec!["*".into()], None, now)
                .unwrap();
        let event = Event::new("user.registered", json!({}), now).unwrap();
        let request = DeliveryRequest::new(&endpoint, &event).unwrap();
        let client = DeliveryClient::with_defaults().unwrap();

        let mut statuses = Vec::new();
        for attempt in 1..=3 {
            statuses.push(match client.attempt(&request, attempt).await {
                AttemptResult::Success(response) => response.status_code,
                AttemptResult::Failure(error) => error.status_code().unwrap_or(0),
            });
        }
        statuses
    }

    #[tokio::test]
    async fn mock_server_starts() {
        let server = MockServer::start().await;
        assert!(server.url().starts_with("http://"));
        assert!(server.endpoint_url(DEFAULT_HOOK_PATH).ends_with("/hooks"));
    }

    #[tokio::test]
    async fn sequence_responds_in_order() {
        let server = MockServer::start().await;
        server.respond_with_sequence(DEFAULT_HOOK_PATH, &[500, 200]).await;

        assert_eq!(post_three_times(&server).await, vec![500, 200, 404]);
        server.assert_request_count(3).await;
    }

    #[tokio::test]
    async fn requests_expose_delivery_headers() {
        let server = MockServer::start().await;
        server.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
        post_three_times(&server).await;

        let requests = server.requests_to(DEFAULT_HOOK_PATH).await;
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].event_type(), Some("user.registered"));
        assert_eq!(requests[2].attempt(), Some(3));
        assert_eq!(requests[0].event_id(), requests[2].event_id());
        assert_eq!(requests[0].envelope().unwrap()["event"], "user.registered");
        assert!(!requests[0].verify_signature("wrong-secret"));
    }
}
