//! Event dispatcher: queue draining, fan-out and per-endpoint pipelines.
//!
//! ```text
//! publish() ──▶ EventQueue ──▶ consumer task ──▶ pipeline per endpoint
//!                (bounded)      (one at a time)    (RetrySchedule + client)
//! ```
//!
//! Producers never wait on delivery. The consumer pops one event at a time,
//! looks up matching endpoints and spawns an independent pipeline for each.
//! Pipelines are tracked by a `TaskTracker` so shutdown can wait for them.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use herald_core::{
    error::{CoreError, Result as CoreResult},
    events::{
        DeliveryAttemptStartedEvent, DeliveryCancelledEvent, DeliveryEvent, DeliveryFailedEvent,
        DeliverySucceededEvent, EventHandler, NoOpEventHandler,
    },
    models::{
        DeadLetter, DeliveryRecord, DeliveryStatus, Endpoint, EndpointId, Event, EventId,
        SigningSecret,
    },
    time::Clock,
};
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    client::{AttemptResult, ClientConfig, DeliveryClient, DeliveryRequest},
    dead_letter::{DeadLetterQueue, DEFAULT_DEAD_LETTER_CAPACITY},
    error::{DeliveryError, ErrorCategory, Result},
    queue::{Activity, DeliveryScope, EventQueue, QueuedEvent, DEFAULT_QUEUE_CAPACITY},
    registry::{DeliveryTarget, EndpointRegistry},
    retry::{RetryDecision, RetryPolicy, RetrySchedule},
    tracker::{DeliveryTracker, DEFAULT_HISTORY_CAPACITY},
};

/// Default upper bound for one lifecycle event handler call.
pub const DEFAULT_EVENT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Events the queue holds before `publish` reports `QueueFull`.
    pub queue_capacity: usize,

    /// Retry policy applied to every pipeline.
    pub retry_policy: RetryPolicy,

    /// HTTP client configuration.
    pub client_config: ClientConfig,

    /// Maximum time `shutdown` waits for running pipelines.
    pub shutdown_timeout: Duration,

    /// Dead letters kept before the oldest are evicted.
    pub dead_letter_capacity: usize,

    /// Finished delivery records kept for inspection.
    pub history_capacity: usize,

    /// Upper bound for one lifecycle event handler call.
    pub event_handler_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_policy: RetryPolicy::default(),
            client_config: ClientConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            event_handler_timeout: DEFAULT_EVENT_HANDLER_TIMEOUT,
        }
    }
}

/// Counters for dispatcher monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events accepted by `publish` and `test_endpoint`.
    pub events_published: u64,
    /// Events taken off the queue by the consumer.
    pub events_processed: u64,
    /// Events that matched no endpoint.
    pub events_discarded: u64,
    /// Pipelines started, one per (event, endpoint).
    pub deliveries_started: u64,
    /// Pipelines that ended with a 2xx response.
    pub deliveries_succeeded: u64,
    /// Individual attempts that failed.
    pub failed_attempts: u64,
    /// Pipelines that exhausted their attempts.
    pub permanent_failures: u64,
    /// Pipelines stopped by deregistration or shutdown.
    pub deliveries_cancelled: u64,
    /// Pipelines currently running.
    pub in_flight_deliveries: u64,
    /// Events waiting in the queue.
    pub queue_depth: usize,
}

/// State shared between the dispatcher handle, the consumer and pipelines.
struct Shared {
    config: DispatcherConfig,
    registry: Arc<EndpointRegistry>,
    client: DeliveryClient,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
    queue: EventQueue,
    activity: Arc<Activity>,
    tracker: DeliveryTracker,
    dead_letters: DeadLetterQueue,
    stats: RwLock<DispatchStats>,
    events_published: AtomicU64,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

/// Fire-and-forget webhook dispatcher.
pub struct Dispatcher {
    shared: Arc<Shared>,
    receiver: Mutex<Option<mpsc::Receiver<QueuedEvent>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.shared.config)
            .field("queue_depth", &self.shared.queue.depth())
            .field("shutting_down", &self.shared.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher that reports lifecycle events to `event_handler`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the retry policy or
    /// queue capacity is invalid or the HTTP client cannot be built.
    pub fn with_event_handler(
        config: DispatcherConfig,
        registry: Arc<EndpointRegistry>,
        clock: Arc<dyn Clock>,
        event_handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(DeliveryError::configuration("queue capacity must be greater than 0"));
        }
        config.retry_policy.validate()?;

        let client = DeliveryClient::new(config.client_config.clone())?;
        let (queue, receiver) = EventQueue::bounded(config.queue_capacity);

        let shared = Shared {
            tracker: DeliveryTracker::new(config.history_capacity),
            dead_letters: DeadLetterQueue::new(config.dead_letter_capacity),
            config,
            registry,
            client,
            clock,
            event_handler,
            queue,
            activity: Arc::new(Activity::default()),
            stats: RwLock::new(DispatchStats::default()),
            events_published: AtomicU64::new(0),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        };

        Ok(Self {
            shared: Arc::new(shared),
            receiver: Mutex::new(Some(receiver)),
            consumer: Mutex::new(None),
        })
    }

    /// Creates a dispatcher without lifecycle event reporting.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::with_event_handler`].
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<EndpointRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_event_handler(config, registry, clock, Arc::new(NoOpEventHandler::new()))
    }

    /// Spawns the queue consumer.
    ///
    /// Events published before `start` are held in the queue and delivered
    /// once the consumer runs.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InternalError` if the dispatcher was already
    /// started or has been shut down.
    pub async fn start(&self) -> Result<()> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| DeliveryError::internal("dispatcher already started or shut down"))?;

        info!(
            queue_capacity = self.shared.config.queue_capacity,
            max_attempts = self.shared.config.retry_policy.max_attempts,
            "starting webhook dispatcher"
        );

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(shared.run_consumer(receiver));
        *self.consumer.lock().await = Some(handle);

        Ok(())
    }

    /// Publishes an event to every active endpoint subscribed to its type.
    ///
    /// Returns as soon as the event is queued; delivery outcomes never reach
    /// the caller.
    ///
    /// # Errors
    ///
    /// - `CoreError::InvalidEventType` for a malformed type name
    /// - `CoreError::QueueFull` when the queue is at capacity
    /// - `CoreError::QueueClosed` after shutdown
    pub fn publish(&self, event_type: &str, data: serde_json::Value) -> CoreResult<EventId> {
        let event = Event::new(event_type, data, self.shared.clock.now_utc())?;
        let event_id = event.id;

        self.shared.enqueue(event, DeliveryScope::Subscribers)?;
        debug!(event_id = %event_id, event_type, "Event queued");

        Ok(event_id)
    }

    /// Queues a `webhook.test` event for one endpoint.
    ///
    /// The endpoint receives it regardless of its subscriptions or active
    /// flag. Returns false for an unknown endpoint or when the event could not
    /// be queued.
    pub async fn test_endpoint(&self, endpoint_id: EndpointId) -> bool {
        if self.shared.registry.ensure_exists(endpoint_id).await.is_err() {
            debug!(endpoint_id = %endpoint_id, "Test requested for unknown endpoint");
            return false;
        }

        let event = Event::test(endpoint_id, self.shared.clock.now_utc());
        let event_id = event.id;

        match self.shared.enqueue(event, DeliveryScope::Endpoint(endpoint_id)) {
            Ok(()) => {
                debug!(event_id = %event_id, endpoint_id = %endpoint_id, "Test event queued");
                true
            },
            Err(e) => {
                warn!(endpoint_id = %endpoint_id, error = %e, "Test event not queued");
                false
            },
        }
    }

    /// Registers an endpoint with the underlying registry.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidEndpoint` for a malformed URL or
    /// subscription list.
    pub async fn register_endpoint(
        &self,
        url: &str,
        event_types: Vec<String>,
        secret: Option<SigningSecret>,
    ) -> CoreResult<EndpointId> {
        self.shared.registry.register(url, event_types, secret).await
    }

    /// Removes an endpoint and cancels its pending retries.
    pub async fn deregister_endpoint(&self, endpoint_id: EndpointId) -> bool {
        self.shared.registry.deregister(endpoint_id).await
    }

    /// Registry shared with this dispatcher.
    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.shared.registry
    }

    /// Delivery records of an event, one per endpoint it fanned out to.
    pub async fn deliveries(&self, event_id: EventId) -> Vec<DeliveryRecord> {
        self.shared.tracker.deliveries_for(event_id).await
    }

    /// Permanently failed deliveries, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.dead_letters.list().await
    }

    /// Dead letter store, for draining.
    pub fn dead_letter_queue(&self) -> &DeadLetterQueue {
        &self.shared.dead_letters
    }

    /// Current counters.
    pub async fn stats(&self) -> DispatchStats {
        let mut stats = self.shared.stats.read().await.clone();
        stats.events_published = self.shared.events_published.load(Ordering::Relaxed);
        stats.queue_depth = self.shared.queue.depth();
        stats
    }

    /// Events waiting for the consumer.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.depth()
    }

    /// Maximum number of waiting events.
    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Returns whether `publish` still accepts events.
    pub fn is_accepting(&self) -> bool {
        !self.shared.shutdown.is_cancelled() && !self.shared.queue.is_closed()
    }

    /// Resolves once the queue is empty and no pipeline is running.
    ///
    /// Never resolves while events sit in the queue of a dispatcher that was
    /// not started.
    pub async fn wait_until_idle(&self) {
        self.shared.activity.wait_idle().await;
    }

    /// Stops the consumer and waits for running pipelines.
    ///
    /// Pipelines waiting on backoff are cancelled; attempts already on the
    /// wire finish first. Events still queued are dropped.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InternalError` if pipelines do not finish
    /// within the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down webhook dispatcher");
        self.shared.shutdown.cancel();

        // Never started: close the queue so later publishes are rejected.
        if let Some(mut receiver) = self.receiver.lock().await.take() {
            receiver.close();
        }

        if let Some(handle) = self.consumer.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Queue consumer task failed");
            }
        }

        self.shared.tasks.close();
        let timeout = self.shared.config.shutdown_timeout;
        if tokio::time::timeout(timeout, self.shared.tasks.wait()).await.is_err() {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                remaining = self.shared.tasks.len(),
                "Shutdown timeout exceeded with pipelines still running"
            );
            return Err(DeliveryError::internal(format!(
                "{} delivery pipelines still running after {}s",
                self.shared.tasks.len(),
                timeout.as_secs()
            )));
        }

        info!("webhook dispatcher stopped");
        Ok(())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    fn enqueue(&self, event: Event, scope: DeliveryScope) -> CoreResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(CoreError::QueueClosed);
        }

        self.queue.enqueue(QueuedEvent { event, scope, _activity: self.activity.enter() })?;
        self.events_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn run_consumer(self: Arc<Self>, mut receiver: mpsc::Receiver<QueuedEvent>) {
        debug!("queue consumer started");

        loop {
            let queued = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                item = receiver.recv() => match item {
                    Some(queued) => queued,
                    None => break,
                },
            };

            Arc::clone(&self).fan_out(queued).await;
        }

        receiver.close();
        let mut dropped = 0usize;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Queued events dropped at shutdown");
        }

        debug!("queue consumer stopped");
    }

    async fn fan_out(self: Arc<Self>, queued: QueuedEvent) {
        let QueuedEvent { event, scope, _activity } = queued;

        let targets = match scope {
            DeliveryScope::Subscribers => self.registry.matching_targets(&event.event_type).await,
            DeliveryScope::Endpoint(endpoint_id) => {
                self.registry.target(endpoint_id).await.into_iter().collect()
            },
        };

        {
            let mut stats = self.stats.write().await;
            stats.events_processed += 1;
            if targets.is_empty() {
                stats.events_discarded += 1;
            }
        }

        if targets.is_empty() {
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "No matching endpoints, event discarded"
            );
            return;
        }

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            endpoints = targets.len(),
            "Fanning out event"
        );

        let event = Arc::new(event);
        for target in targets {
            let guard = self.activity.enter();
            let shared = Arc::clone(&self);
            let event = Arc::clone(&event);
            self.tasks.spawn(async move {
                shared.deliver(event, target).await;
                drop(guard);
            });
        }
    }

    async fn deliver(&self, event: Arc<Event>, target: DeliveryTarget) {
        let DeliveryTarget { endpoint, removed } = target;
        let mut record = DeliveryRecord::pending(&event, endpoint.id, self.clock.now_utc());
        self.tracker.upsert(record.clone()).await;

        {
            let mut stats = self.stats.write().await;
            stats.deliveries_started += 1;
            stats.in_flight_deliveries += 1;
        }

        match DeliveryRequest::new(&endpoint, &event) {
            Ok(request) => {
                self.run_pipeline(&event, &endpoint, &request, &removed, &mut record).await;
            },
            Err(e) => {
                record.last_error = Some(e.to_string());
                self.dead_letter(&event, &endpoint, &mut record, 0, ErrorCategory::from(&e)).await;
            },
        }

        let mut stats = self.stats.write().await;
        stats.in_flight_deliveries = stats.in_flight_deliveries.saturating_sub(1);
    }

    async fn run_pipeline(
        &self,
        event: &Event,
        endpoint: &Endpoint,
        request: &DeliveryRequest,
        removed: &CancellationToken,
        record: &mut DeliveryRecord,
    ) {
        let mut schedule = RetrySchedule::new(self.config.retry_policy.clone());

        loop {
            let attempt_number = match schedule.begin_attempt() {
                Ok(n) => n,
                Err(e) => {
                    error!(
                        event_id = %event.id,
                        endpoint_id = %endpoint.id,
                        error = %e,
                        "Pipeline state error"
                    );
                    return;
                },
            };

            record.attempt_count = attempt_number;
            record.next_attempt_at = None;
            record.updated_at = self.clock.now_utc();
            self.tracker.upsert(record.clone()).await;

            self.emit(DeliveryEvent::AttemptStarted(DeliveryAttemptStartedEvent {
                event_id: event.id,
                endpoint_id: endpoint.id,
                endpoint_url: endpoint.url.clone(),
                event_type: event.event_type.clone(),
                attempt_number,
                started_at: record.updated_at,
            }))
            .await;

            // Nothing is on the wire yet, so a removal seen here stops the pipeline.
            if let Some(reason) = self.stop_reason(removed) {
                schedule.cancel();
                self.cancel(event, endpoint, record, reason).await;
                return;
            }

            let error = match self.client.attempt(request, attempt_number).await {
                AttemptResult::Success(response) => {
                    if let Err(e) = schedule.record_success() {
                        error!(
                            event_id = %event.id,
                            endpoint_id = %endpoint.id,
                            error = %e,
                            "Pipeline state error"
                        );
                    }

                    let duration_ms = response.duration.as_millis() as u64;
                    info!(
                        event_id = %event.id,
                        endpoint_id = %endpoint.id,
                        event_type = %event.event_type,
                        attempt = attempt_number,
                        status_code = response.status_code,
                        duration_ms,
                        "Webhook delivered"
                    );

                    record.status = DeliveryStatus::Delivered;
                    record.updated_at = self.clock.now_utc();
                    self.tracker.upsert(record.clone()).await;
                    self.stats.write().await.deliveries_succeeded += 1;

                    self.emit(DeliveryEvent::Succeeded(DeliverySucceededEvent {
                        event_id: event.id,
                        endpoint_id: endpoint.id,
                        endpoint_url: endpoint.url.clone(),
                        event_type: event.event_type.clone(),
                        response_status: response.status_code,
                        attempt_number,
                        duration_ms,
                        delivered_at: record.updated_at,
                    }))
                    .await;
                    return;
                },
                AttemptResult::Failure(error) => error,
            };

            let failed_at = self.clock.now_utc();
            let response_status = error.status_code();
            let error_message = error.to_string();
            let category = ErrorCategory::from(&error);
            record.last_error = Some(error_message.clone());
            record.updated_at = failed_at;
            self.stats.write().await.failed_attempts += 1;

            // The attempt was allowed to finish, but nothing follows it.
            if let Some(reason) = self.stop_reason(removed) {
                self.emit_failed(
                    event,
                    endpoint,
                    attempt_number,
                    response_status,
                    &error_message,
                    None,
                )
                .await;
                schedule.cancel();
                self.cancel(event, endpoint, record, reason).await;
                return;
            }

            let decision = match schedule.record_failure(error, failed_at) {
                Ok(decision) => decision,
                Err(e) => {
                    error!(
                        event_id = %event.id,
                        endpoint_id = %endpoint.id,
                        error = %e,
                        "Pipeline state error"
                    );
                    return;
                },
            };

            match decision {
                RetryDecision::Retry { delay, next_attempt_at } => {
                    let retry_in_ms = delay.as_millis() as u64;
                    warn!(
                        event_id = %event.id,
                        endpoint_id = %endpoint.id,
                        event_type = %event.event_type,
                        attempt = attempt_number,
                        status_code = response_status,
                        error = %error_message,
                        error_category = %category,
                        retry_in_ms,
                        "Delivery attempt failed, retry scheduled"
                    );

                    record.next_attempt_at = Some(next_attempt_at);
                    self.tracker.upsert(record.clone()).await;
                    self.emit_failed(
                        event,
                        endpoint,
                        attempt_number,
                        response_status,
                        &error_message,
                        Some(retry_in_ms),
                    )
                    .await;

                    let stopped = tokio::select! {
                        biased;
                        () = removed.cancelled() => Some("endpoint deregistered"),
                        () = self.shutdown.cancelled() => Some("dispatcher shutting down"),
                        () = self.clock.sleep(delay) => None,
                    };

                    if let Some(reason) = stopped {
                        schedule.cancel();
                        self.cancel(event, endpoint, record, reason).await;
                        return;
                    }
                },
                RetryDecision::GiveUp { reason } => {
                    debug!(event_id = %event.id, endpoint_id = %endpoint.id, reason, "Giving up");
                    self.emit_failed(
                        event,
                        endpoint,
                        attempt_number,
                        response_status,
                        &error_message,
                        None,
                    )
                    .await;
                    self.dead_letter(event, endpoint, record, schedule.attempt_count(), category)
                        .await;
                    return;
                },
            }
        }
    }

    fn stop_reason(&self, removed: &CancellationToken) -> Option<&'static str> {
        if removed.is_cancelled() {
            Some("endpoint deregistered")
        } else if self.shutdown.is_cancelled() {
            Some("dispatcher shutting down")
        } else {
            None
        }
    }

    async fn dead_letter(
        &self,
        event: &Event,
        endpoint: &Endpoint,
        record: &mut DeliveryRecord,
        attempts: u32,
        category: ErrorCategory,
    ) {
        let last_error = record.last_error.clone().unwrap_or_default();
        error!(
            endpoint_id = %endpoint.id,
            event_id = %event.id,
            event_type = %event.event_type,
            attempts,
            last_error = %last_error,
            error_category = %category,
            error = %DeliveryError::retries_exhausted(attempts),
            "Webhook delivery permanently failed"
        );

        let dead_letter = DeadLetter {
            endpoint_id: endpoint.id,
            endpoint_url: endpoint.url.clone(),
            event_id: event.id,
            event_type: event.event_type.clone(),
            last_error,
            attempts,
            failed_at: self.clock.now_utc(),
        };

        record.status = DeliveryStatus::Failed;
        record.next_attempt_at = None;
        record.updated_at = dead_letter.failed_at;
        self.tracker.upsert(record.clone()).await;
        self.dead_letters.push(dead_letter.clone()).await;
        self.stats.write().await.permanent_failures += 1;

        self.emit(DeliveryEvent::DeadLettered(dead_letter)).await;
    }

    async fn cancel(
        &self,
        event: &Event,
        endpoint: &Endpoint,
        record: &mut DeliveryRecord,
        reason: &str,
    ) {
        info!(
            event_id = %event.id,
            endpoint_id = %endpoint.id,
            attempts = record.attempt_count,
            reason,
            "Delivery cancelled"
        );

        record.status = DeliveryStatus::Cancelled;
        record.next_attempt_at = None;
        record.updated_at = self.clock.now_utc();
        self.tracker.upsert(record.clone()).await;
        self.stats.write().await.deliveries_cancelled += 1;

        self.emit(DeliveryEvent::Cancelled(DeliveryCancelledEvent {
            event_id: event.id,
            endpoint_id: endpoint.id,
            attempt_count: record.attempt_count,
            reason: reason.to_string(),
            cancelled_at: record.updated_at,
        }))
        .await;
    }

    async fn emit_failed(
        &self,
        event: &Event,
        endpoint: &Endpoint,
        attempt_number: u32,
        response_status: Option<u16>,
        error_message: &str,
        next_attempt_in_ms: Option<u64>,
    ) {
        self.emit(DeliveryEvent::Failed(DeliveryFailedEvent {
            event_id: event.id,
            endpoint_id: endpoint.id,
            endpoint_url: endpoint.url.clone(),
            event_type: event.event_type.clone(),
            response_status,
            attempt_number,
            error_message: error_message.to_string(),
            will_retry: next_attempt_in_ms.is_some(),
            next_attempt_in_ms,
            failed_at: self.clock.now_utc(),
        }))
        .await;
    }

    /// Hands `event` to the lifecycle handler, giving up after the configured
    /// timeout so a stalled handler cannot hold the pipeline.
    async fn emit(&self, event: DeliveryEvent) {
        let timeout = self.config.event_handler_timeout;
        let event_id = event.event_id();
        let endpoint_id = event.endpoint_id();

        if tokio::time::timeout(timeout, self.event_handler.handle_event(event)).await.is_err() {
            warn!(
                event_id = %event_id,
                endpoint_id = %endpoint_id,
                timeout_ms = timeout.as_millis() as u64,
                "Event handler timed out"
            );
        }
    }
}
