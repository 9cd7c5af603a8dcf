//! Integration tests for the dispatcher.
//!
//! Each test runs a started dispatcher against a wiremock receiver. Backoff
//! runs on a `TestClock`, so retry schedules complete without wall-time
//! waits.

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::Result;
use herald_core::{CoreError, DeliveryEvent, DeliveryStatus, EventHandler};
use herald_delivery::{DeliveryError, DispatcherConfig, EndpointRegistry, RetryPolicy};
use herald_testing::{TestEnv, DEFAULT_HOOK_PATH};
use serde_json::json;

/// Deregisters the endpoint as soon as its first attempt is announced.
#[derive(Debug, Default)]
struct DeregisterOnAttemptStart {
    registry: OnceLock<Arc<EndpointRegistry>>,
}

#[async_trait::async_trait]
impl EventHandler for DeregisterOnAttemptStart {
    async fn handle_event(&self, event: DeliveryEvent) {
        if let (DeliveryEvent::AttemptStarted(started), Some(registry)) =
            (event, self.registry.get())
        {
            registry.deregister(started.endpoint_id).await;
        }
    }
}

/// Never finishes handling an event.
#[derive(Debug)]
struct StalledHandler;

#[async_trait::async_trait]
impl EventHandler for StalledHandler {
    async fn handle_event(&self, _event: DeliveryEvent) {
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn event_reaches_every_subscriber_with_same_id() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status("/a", 200).await;
    env.http_mock.respond_with_status("/b", 200).await;
    let a = env.register("/a", &["user.registered"]).await?;
    let b = env.register("/b", &["user.registered", "user.updated"]).await?;

    let event_id = env.dispatcher.publish("user.registered", json!({"user_id": 42}))?;
    env.wait_until_idle().await?;

    let to_a = env.http_mock.requests_to("/a").await;
    let to_b = env.http_mock.requests_to("/b").await;
    assert_eq!(to_a.len(), 1);
    assert_eq!(to_b.len(), 1);

    for (request, endpoint) in [(&to_a[0], &a), (&to_b[0], &b)] {
        let envelope = request.envelope()?;
        assert_eq!(envelope["id"], event_id.to_string());
        assert_eq!(envelope["event"], "user.registered");
        assert_eq!(envelope["data"], json!({"user_id": 42}));
        assert_eq!(request.event_id(), Some(event_id.to_string().as_str()));
        assert_eq!(request.event_type(), Some("user.registered"));
        assert_eq!(request.attempt(), Some(1));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert!(request.verify_signature(endpoint.secret.expose()));
    }
    assert_ne!(to_a[0].signature(), to_b[0].signature(), "secrets differ per endpoint");

    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == DeliveryStatus::Delivered && r.attempt_count == 1));

    env.shutdown().await
}

#[tokio::test]
async fn unmatched_event_sends_nothing() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    env.register(DEFAULT_HOOK_PATH, &["user.updated"]).await?;

    let event_id = env.dispatcher.publish("comment.created", json!({}))?;
    env.wait_until_idle().await?;

    env.http_mock.assert_request_count(0).await;
    assert!(env.dispatcher.deliveries(event_id).await.is_empty());
    let stats = env.dispatcher.stats().await;
    assert_eq!(stats.events_discarded, 1);
    assert_eq!(stats.deliveries_started, 0);

    env.shutdown().await
}

#[tokio::test]
async fn inactive_endpoint_is_skipped() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    let endpoint = env.register(DEFAULT_HOOK_PATH, &["user.registered"]).await?;
    env.registry.set_active(endpoint.id, false).await;

    env.dispatcher.publish("user.registered", json!({}))?;
    env.wait_until_idle().await?;

    env.http_mock.assert_request_count(0).await;
    env.shutdown().await
}

#[tokio::test]
async fn wildcard_subscription_receives_everything() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    env.register(DEFAULT_HOOK_PATH, &["*"]).await?;

    env.dispatcher.publish("user.registered", json!({}))?;
    env.dispatcher.publish("message.sent", json!({}))?;
    env.wait_until_idle().await?;

    let types: HashSet<_> = env
        .http_mock
        .received_requests()
        .await
        .iter()
        .filter_map(|r| r.event_type().map(str::to_string))
        .collect();
    assert_eq!(types, HashSet::from(["user.registered".to_string(), "message.sent".to_string()]));

    env.shutdown().await
}

#[tokio::test]
async fn failed_attempts_retry_until_success() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_sequence(DEFAULT_HOOK_PATH, &[500, 503]).await;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    env.register(DEFAULT_HOOK_PATH, &["user.registered"]).await?;

    let event_id = env.dispatcher.publish("user.registered", json!({}))?;
    env.wait_until_idle().await?;

    let requests = env.http_mock.received_requests().await;
    let attempts: Vec<_> = requests.iter().filter_map(|r| r.attempt()).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(requests.iter().all(|r| r.body == requests[0].body), "body identical across retries");
    assert_eq!(env.clock.recorded_sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);

    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeliveryStatus::Delivered);
    assert_eq!(records[0].attempt_count, 3);
    assert_eq!(env.events.failed_count().await, 2);
    assert_eq!(env.events.succeeded_count().await, 1);

    env.shutdown().await
}

#[tokio::test]
async fn exhausted_retries_produce_dead_letter() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 500).await;
    let endpoint = env.register(DEFAULT_HOOK_PATH, &["user.registered"]).await?;

    let event_id = env.dispatcher.publish("user.registered", json!({}))?;
    env.wait_until_idle().await?;

    env.http_mock.assert_request_count(4).await;
    assert_eq!(
        env.clock.recorded_sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );

    let dead_letters = env.dispatcher.dead_letters().await;
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].event_id, event_id);
    assert_eq!(dead_letters[0].endpoint_id, endpoint.id);
    assert_eq!(dead_letters[0].attempts, 4);
    assert_eq!(dead_letters[0].last_error, "unexpected response: HTTP 500");

    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records[0].status, DeliveryStatus::Failed);
    assert_eq!(records[0].attempt_count, 4);

    let stats = env.dispatcher.stats().await;
    assert_eq!(stats.failed_attempts, 4);
    assert_eq!(stats.permanent_failures, 1);
    assert_eq!(stats.in_flight_deliveries, 0);
    assert_eq!(env.events.dead_lettered_count().await, 1);

    let last_failure = env
        .events
        .events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            DeliveryEvent::Failed(failed) => Some(failed),
            _ => None,
        })
        .last()
        .expect("failure events recorded");
    assert!(!last_failure.will_retry);
    assert_eq!(last_failure.response_status, Some(500));

    env.shutdown().await
}

#[tokio::test]
async fn deregistration_cancels_pending_retry() -> Result<()> {
    let env = TestEnv::builder().manual_clock().build().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 500).await;
    let endpoint = env.register(DEFAULT_HOOK_PATH, &["user.registered"]).await?;

    let event_id = env.dispatcher.publish("user.registered", json!({}))?;
    env.wait_for_sleepers(1).await?;
    env.http_mock.assert_request_count(1).await;

    assert!(env.dispatcher.deregister_endpoint(endpoint.id).await);
    env.wait_until_idle().await?;

    env.clock.advance(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_millis(50)).await;
    env.http_mock.assert_request_count(1).await;

    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records[0].status, DeliveryStatus::Cancelled);
    assert_eq!(records[0].attempt_count, 1);
    assert!(env.dispatcher.dead_letters().await.is_empty());
    assert_eq!(env.events.cancelled_count().await, 1);
    assert_eq!(env.dispatcher.stats().await.deliveries_cancelled, 1);

    env.shutdown().await
}

#[tokio::test]
async fn deactivation_does_not_cancel_pending_retry() -> Result<()> {
    let env = TestEnv::builder().manual_clock().build().await?;
    env.http_mock.respond_with_sequence(DEFAULT_HOOK_PATH, &[500]).await;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    let endpoint = env.register(DEFAULT_HOOK_PATH, &["user.registered"]).await?;

    let event_id = env.dispatcher.publish("user.registered", json!({}))?;
    env.wait_for_sleepers(1).await?;

    env.registry.set_active(endpoint.id, false).await;
    env.clock.advance(Duration::from_secs(1));
    env.wait_until_idle().await?;

    env.http_mock.assert_request_count(2).await;
    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records[0].status, DeliveryStatus::Delivered);

    env.shutdown().await
}

#[tokio::test]
async fn failing_endpoint_does_not_affect_others() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status("/broken", 500).await;
    env.http_mock.respond_with_status("/healthy", 204).await;
    env.register("/broken", &["experience.created"]).await?;
    let healthy = env.register("/healthy", &["experience.created"]).await?;

    let event_id = env.dispatcher.publish("experience.created", json!({"id": "exp-1"}))?;
    env.wait_until_idle().await?;

    assert_eq!(env.http_mock.requests_to("/broken").await.len(), 4);
    assert_eq!(env.http_mock.requests_to("/healthy").await.len(), 1);

    let records = env.dispatcher.deliveries(event_id).await;
    let healthy_record = records.iter().find(|r| r.endpoint_id == healthy.id).expect("record");
    assert_eq!(healthy_record.status, DeliveryStatus::Delivered);
    assert_eq!(healthy_record.attempt_count, 1);
    assert_eq!(env.dispatcher.dead_letters().await.len(), 1);

    env.shutdown().await
}

#[tokio::test]
async fn test_endpoint_bypasses_subscription_and_active_flag() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    let endpoint = env.register(DEFAULT_HOOK_PATH, &["user.updated"]).await?;
    env.registry.set_active(endpoint.id, false).await;

    assert!(env.dispatcher.test_endpoint(endpoint.id).await);
    env.wait_until_idle().await?;

    let requests = env.http_mock.received_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].event_type(), Some("webhook.test"));
    assert_eq!(requests[0].envelope()?["data"]["endpoint_id"], endpoint.id.to_string());
    assert!(requests[0].verify_signature(endpoint.secret.expose()));

    env.shutdown().await
}

#[tokio::test]
async fn test_endpoint_does_not_reach_other_endpoints() -> Result<()> {
    let env = TestEnv::new().await?;
    env.http_mock.respond_with_status("/target", 200).await;
    env.http_mock.respond_with_status("/bystander", 200).await;
    let target = env.register("/target", &["*"]).await?;
    env.register("/bystander", &["*"]).await?;

    assert!(env.dispatcher.test_endpoint(target.id).await);
    env.wait_until_idle().await?;

    assert_eq!(env.http_mock.requests_to("/target").await.len(), 1);
    assert!(env.http_mock.requests_to("/bystander").await.is_empty());

    env.shutdown().await
}

#[tokio::test]
async fn many_events_fan_out_concurrently() -> Result<()> {
    let env = TestEnv::new().await?;
    let paths = ["/one", "/two", "/three"];
    for path in paths {
        env.http_mock.respond_with_status(path, 200).await;
        env.register(path, &["message.sent"]).await?;
    }

    let mut published = HashSet::new();
    for n in 0..20 {
        published.insert(env.dispatcher.publish("message.sent", json!({"n": n}))?.to_string());
    }
    env.wait_until_idle().await?;

    for path in paths {
        let ids: HashSet<_> = env
            .http_mock
            .requests_to(path)
            .await
            .iter()
            .filter_map(|r| r.event_id().map(str::to_string))
            .collect();
        assert_eq!(ids, published, "{path} should receive every event exactly once");
    }

    let stats = env.dispatcher.stats().await;
    assert_eq!(stats.events_published, 20);
    assert_eq!(stats.events_processed, 20);
    assert_eq!(stats.deliveries_succeeded, 60);

    env.shutdown().await
}

#[tokio::test]
async fn shutdown_cancels_backoff_and_closes_queue() -> Result<()> {
    let env = TestEnv::builder().manual_clock().build().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 500).await;
    env.register(DEFAULT_HOOK_PATH, &["user.registered"]).await?;

    let event_id = env.dispatcher.publish("user.registered", json!({}))?;
    env.wait_for_sleepers(1).await?;

    env.dispatcher.shutdown().await?;

    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records[0].status, DeliveryStatus::Cancelled);
    assert_eq!(
        env.dispatcher.publish("user.registered", json!({})),
        Err(CoreError::QueueClosed)
    );
    Ok(())
}

#[tokio::test]
async fn deregistration_before_first_attempt_sends_nothing() -> Result<()> {
    let handler = Arc::new(DeregisterOnAttemptStart::default());
    let env = TestEnv::builder().event_handler(handler.clone()).build().await?;
    handler.registry.set(env.registry.clone()).expect("registry set once");
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    env.register(DEFAULT_HOOK_PATH, &["user.registered"]).await?;

    let event_id = env.dispatcher.publish("user.registered", json!({}))?;
    env.wait_until_idle().await?;

    env.http_mock.assert_request_count(0).await;
    assert!(env.registry.is_empty().await);

    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeliveryStatus::Cancelled);
    assert_eq!(env.events.succeeded_count().await, 0);
    assert_eq!(env.events.cancelled_count().await, 1);

    let stats = env.dispatcher.stats().await;
    assert_eq!(stats.deliveries_succeeded, 0);
    assert_eq!(stats.deliveries_cancelled, 1);

    env.shutdown().await
}

#[tokio::test]
async fn slow_receiver_times_out_then_succeeds_on_retry() -> Result<()> {
    let env = TestEnv::builder().client_timeout(Duration::from_millis(200)).build().await?;
    env.http_mock.respond_with_delay(DEFAULT_HOOK_PATH, 200, Duration::from_secs(2)).await;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    env.register(DEFAULT_HOOK_PATH, &["order.created"]).await?;

    let event_id = env.dispatcher.publish("order.created", json!({"order_id": "ord_1"}))?;
    env.wait_until_idle().await?;

    let attempts: Vec<_> =
        env.http_mock.received_requests().await.iter().filter_map(|r| r.attempt()).collect();
    assert_eq!(attempts, vec![1, 2]);
    assert_eq!(env.clock.recorded_sleeps(), vec![Duration::from_secs(1)]);

    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records[0].status, DeliveryStatus::Delivered);
    assert_eq!(records[0].attempt_count, 2);
    assert_eq!(
        records[0].last_error.as_deref(),
        Some(DeliveryError::timeout(0).to_string().as_str()),
        "sub-second timeouts report 0s"
    );
    assert_eq!(env.events.failed_count().await, 1);

    env.shutdown().await
}

#[tokio::test]
async fn configured_policy_bounds_attempts_and_dead_letters_drain() -> Result<()> {
    let config = DispatcherConfig {
        retry_policy: RetryPolicy { max_attempts: 2, ..RetryPolicy::default() },
        ..DispatcherConfig::default()
    };
    let env = TestEnv::builder().config(config).build().await?;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 410).await;
    env.register(DEFAULT_HOOK_PATH, &["user.updated"]).await?;

    env.dispatcher.publish("user.updated", json!({}))?;
    env.wait_until_idle().await?;

    env.http_mock.assert_request_count(2).await;
    assert_eq!(env.clock.recorded_sleeps(), vec![Duration::from_secs(1)]);

    let drained = env.dispatcher.dead_letter_queue().drain().await;
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].attempts, 2);
    assert_eq!(drained[0].last_error, "unexpected response: HTTP 410");
    assert!(env.dispatcher.dead_letters().await.is_empty());

    env.shutdown().await
}

#[tokio::test]
async fn stalled_event_handler_does_not_block_delivery() -> Result<()> {
    let config = DispatcherConfig {
        event_handler_timeout: Duration::from_millis(50),
        ..DispatcherConfig::default()
    };
    let env =
        TestEnv::builder().config(config).event_handler(Arc::new(StalledHandler)).build().await?;
    env.http_mock.respond_with_sequence(DEFAULT_HOOK_PATH, &[500]).await;
    env.http_mock.respond_with_status(DEFAULT_HOOK_PATH, 200).await;
    env.register(DEFAULT_HOOK_PATH, &["message.sent"]).await?;

    let event_id = env.dispatcher.publish("message.sent", json!({}))?;
    env.wait_until_idle().await?;

    env.http_mock.assert_request_count(2).await;
    let records = env.dispatcher.deliveries(event_id).await;
    assert_eq!(records[0].status, DeliveryStatus::Delivered);

    env.shutdown().await
}
