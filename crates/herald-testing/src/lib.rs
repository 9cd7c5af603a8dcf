//! Test infrastructure for the webhook engine.
//!
//! [`TestEnv`] wires a registry and dispatcher to a deterministic
//! [`TestClock`], a recording event handler and a wiremock receiver, so
//! integration tests exercise full delivery pipelines without waiting on wall
//! time.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use herald_core::{models::Endpoint, Clock, EventHandler, MulticastEventHandler};
use herald_delivery::{ClientConfig, Dispatcher, DispatcherConfig, EndpointRegistry};

pub mod events;
pub mod http;

pub use events::RecordingEventHandler;
pub use herald_core::TestClock;
pub use http::{MockServer, WebhookRequest, DEFAULT_HOOK_PATH};

/// Upper bound for `TestEnv` waits.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatcher, registry and receiver wired together for one test.
pub struct TestEnv {
    /// HTTP receiver for deliveries.
    pub http_mock: MockServer,
    /// Deterministic clock driving backoff.
    pub clock: TestClock,
    /// Registry shared with the dispatcher.
    pub registry: Arc<EndpointRegistry>,
    /// Started dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Records every delivery lifecycle event.
    pub events: Arc<RecordingEventHandler>,
}

impl TestEnv {
    /// Creates an environment whose clock advances instantly on sleep.
    pub async fn new() -> Result<Self> {
        Self::builder().build().await
    }

    /// Starts a builder for custom environments.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::default()
    }

    /// Registers an endpoint on the mock server at `path`.
    pub async fn register(&self, path: &str, event_types: &[&str]) -> Result<Endpoint> {
        let endpoint = self
            .registry
            .register_endpoint(
                &self.http_mock.endpoint_url(path),
                event_types.iter().map(|s| s.to_string()).collect(),
                None,
            )
            .await
            .context("failed to register test endpoint")?;
        Ok(endpoint)
    }

    /// Waits until the dispatcher has no queued or running work.
    pub async fn wait_until_idle(&self) -> Result<()> {
        tokio::time::timeout(DEFAULT_WAIT_TIMEOUT, self.dispatcher.wait_until_idle())
            .await
            .context("dispatcher did not become idle")
    }

    /// Waits until `count` pipelines are parked on the clock.
    pub async fn wait_for_sleepers(&self, count: usize) -> Result<()> {
        let wait = async {
            while self.clock.sleeper_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(DEFAULT_WAIT_TIMEOUT, wait)
            .await
            .with_context(|| format!("{count} pipelines never reached backoff"))
    }

    /// Shuts the dispatcher down.
    pub async fn shutdown(self) -> Result<()> {
        self.dispatcher.shutdown().await.context("dispatcher shutdown failed")
    }
}

/// Builder for [`TestEnv`].
#[derive(Debug, Clone)]
pub struct TestEnvBuilder {
    config: DispatcherConfig,
    manual_clock: bool,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        let config = DispatcherConfig {
            client_config: ClientConfig {
                timeout: Duration::from_secs(2),
                ..ClientConfig::default()
            },
            shutdown_timeout: Duration::from_secs(5),
            ..DispatcherConfig::default()
        };
        Self { config, manual_clock: false, handlers: Vec::new() }
    }
}

impl TestEnvBuilder {
    /// Uses a clock that only moves on `TestClock::advance`.
    pub fn manual_clock(mut self) -> Self {
        self.manual_clock = true;
        self
    }

    /// Overrides the dispatcher configuration.
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a lifecycle event handler next to the recording one.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Overrides the per-attempt HTTP timeout.
    pub fn client_timeout(mut self, timeout: Duration) -> Self {
        self.config.client_config.timeout = timeout;
        self
    }

    /// Builds and starts the environment.
    pub async fn build(self) -> Result<TestEnv> {
        let clock = if self.manual_clock { TestClock::manual() } else { TestClock::new() };
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let registry = Arc::new(EndpointRegistry::new(shared_clock.clone()));
        let events = Arc::new(RecordingEventHandler::new());

        let mut handler = MulticastEventHandler::new();
        handler.add_subscriber(events.clone());
        for extra in self.handlers {
            handler.add_subscriber(extra);
        }

        let dispatcher = Dispatcher::with_event_handler(
            self.config,
            registry.clone(),
            shared_clock,
            Arc::new(handler),
        )
        .context("failed to build dispatcher")?;
        dispatcher.start().await.context("failed to start dispatcher")?;

        Ok(TestEnv {
            http_mock: MockServer::start().await,
            clock,
            registry,
            dispatcher: Arc::new(dispatcher),
            events,
        })
    }
}
