//! Event handler that records delivery lifecycle events for assertions.
//!
//! Waits are bounded by a timeout so a missing event fails the test instead
//! of hanging CI.

use std::time::Duration;

use async_trait::async_trait;
use herald_core::{DeliveryEvent, EventHandler, EventId};
use tokio::sync::{Notify, RwLock};

/// Default timeout for event waits.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Records every event it receives, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: RwLock<Vec<DeliveryEvent>>,
    received: Notify,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events.
    pub async fn events(&self) -> Vec<DeliveryEvent> {
        self.events.read().await.clone()
    }

    /// Events concerning one published event.
    pub async fn events_for(&self, event_id: EventId) -> Vec<DeliveryEvent> {
        self.events.read().await.iter().filter(|e| e.event_id() == event_id).cloned().collect()
    }

    /// Number of recorded events matching `predicate`.
    pub async fn count(&self, predicate: impl Fn(&DeliveryEvent) -> bool) -> usize {
        self.events.read().await.iter().filter(|e| predicate(e)).count()
    }

    /// Number of successful deliveries recorded.
    pub async fn succeeded_count(&self) -> usize {
        self.count(|e| matches!(e, DeliveryEvent::Succeeded(_))).await
    }

    /// Number of failed attempts recorded.
    pub async fn failed_count(&self) -> usize {
        self.count(|e| matches!(e, DeliveryEvent::Failed(_))).await
    }

    /// Number of dead-lettered deliveries recorded.
    pub async fn dead_lettered_count(&self) -> usize {
        self.count(|e| matches!(e, DeliveryEvent::DeadLettered(_))).await
    }

    /// Number of cancelled deliveries recorded.
    pub async fn cancelled_count(&self) -> usize {
        self.count(|e| matches!(e, DeliveryEvent::Cancelled(_))).await
    }

    /// Waits until `predicate` matches at least `count` events.
    ///
    /// # Panics
    ///
    /// Panics when `timeout` elapses first.
    pub async fn wait_for(
        &self,
        count: usize,
        timeout: Duration,
        predicate: impl Fn(&DeliveryEvent) -> bool,
    ) {
        let wait = async {
            loop {
                let notified = self.received.notified();
                if self.count(&predicate).await >= count {
                    return;
                }
                notified.await;
            }
        };

        if tokio::time::timeout(timeout, wait).await.is_err() {
            let seen = self.count(&predicate).await;
            panic!("timed out after {timeout:?} waiting for {count} events, saw {seen}");
        }
    }

    /// Clears recorded events.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        self.events.write().await.push(event);
        self.received.notify_waiters();
    }
}
