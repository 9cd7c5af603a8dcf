//! End-to-end tests over a real TCP listener.
//!
//! Drives the API with an HTTP client the way an operator would: register an
//! endpoint, publish events, then inspect what the receiver saw.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use herald_api::{serve, AppState};
use herald_core::Clock;
use herald_testing::{TestEnv, DEFAULT_HOOK_PATH, DEFAULT_WAIT_TIMEOUT};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

struct RunningServer {
    base_url: String,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    async fn start(env: &TestEnv) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let clock: Arc<dyn Clock> = Arc::new(env.clock.clone());
        let state = AppState::new(env.dispatcher.clone(), clock);
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(serve(listener, state, async move {
            let _ = stopped.await;
        }));

        Ok(Self { base_url, stop, handle })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn stop(self) -> Result<()> {
        let _ = self.stop.send(());
        self.handle.await??;
        Ok(())
    }
}

/// The golden path: register, publish, receive a signed delivery.
#[tokio::test]
async fn published_event_arrives_signed() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    let server = RunningServer::start(&env).await?;
    let client = reqwest::Client::new();

    let endpoint: Value = client
        .post(server.url("/endpoints"))
        .json(&json!({
            "url": env.http_mock.endpoint_url(DEFAULT_HOOK_PATH),
            "event_types": ["payment.completed"],
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let secret = endpoint["secret"].as_str().expect("secret returned on create").to_string();

    let response = client
        .post(server.url("/events"))
        .json(&json!({"event": "payment.completed", "data": {"amount": 2000}}))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let published: Value = response.json().await?;
    let event_id = published["id"].as_str().expect("event id").to_string();

    let requests = env.http_mock.wait_for_requests(1, DEFAULT_WAIT_TIMEOUT).await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.event_type(), Some("payment.completed"));
    assert_eq!(request.event_id(), Some(event_id.as_str()));
    assert_eq!(request.attempt(), Some(1));
    assert!(request.verify_signature(&secret));

    let envelope = request.envelope()?;
    assert_eq!(envelope["id"], event_id.as_str());
    assert_eq!(envelope["event"], "payment.completed");
    assert_eq!(envelope["data"]["amount"], 2000);

    server.stop().await?;
    env.shutdown().await
}

/// A flaky receiver is retried with backoff until it accepts.
#[tokio::test]
async fn flaky_receiver_is_retried_until_delivered() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_sequence(DEFAULT_HOOK_PATH, &[503, 503, 200]).await;
    env.register(DEFAULT_HOOK_PATH, &["*"]).await?;
    let server = RunningServer::start(&env).await?;
    let client = reqwest::Client::new();

    let published: Value = client
        .post(server.url("/events"))
        .json(&json!({"event": "order.created", "data": {"order_id": "ord_1"}}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let event_id = published["id"].as_str().expect("event id");

    env.wait_until_idle().await?;

    let attempts: Vec<_> =
        env.http_mock.received_requests().await.iter().filter_map(|r| r.attempt()).collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let deliveries: Value = client
        .get(server.url(&format!("/events/{event_id}/deliveries")))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(deliveries[0]["status"], "delivered");
    assert_eq!(deliveries[0]["attempt_count"], 3);

    let stats: Value = client.get(server.url("/stats")).send().await?.json().await?;
    assert_eq!(stats["deliveries_succeeded"], 1);
    assert_eq!(stats["failed_attempts"], 2);

    server.stop().await?;
    env.shutdown().await
}
