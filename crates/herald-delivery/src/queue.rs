//! Bounded in-memory event queue.
//!
//! Producers enqueue without waiting: a full queue is reported as
//! `CoreError::QueueFull` instead of growing without bound. A single consumer
//! task drains events in submission order.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use herald_core::{
    error::{CoreError, Result},
    models::{EndpointId, Event},
};
use tokio::sync::{mpsc, Notify};

/// Default number of events the queue holds before rejecting publishes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Which endpoints a queued event fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryScope {
    /// Every active endpoint subscribed to the event type.
    Subscribers,
    /// One endpoint, regardless of subscriptions or the active flag.
    Endpoint(EndpointId),
}

/// Event waiting for the consumer.
#[derive(Debug)]
pub(crate) struct QueuedEvent {
    pub(crate) event: Event,
    pub(crate) scope: DeliveryScope,
    pub(crate) _activity: ActivityGuard,
}

/// Producer half of the delivery queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    sender: mpsc::Sender<QueuedEvent>,
    capacity: usize,
}

impl EventQueue {
    /// Creates a queue and its consumer half.
    pub(crate) fn bounded(capacity: usize) -> (Self, mpsc::Receiver<QueuedEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, capacity }, receiver)
    }

    /// Enqueues without waiting.
    pub(crate) fn enqueue(&self, item: QueuedEvent) -> Result<()> {
        self.sender.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CoreError::QueueFull { capacity: self.capacity },
            mpsc::error::TrySendError::Closed(_) => CoreError::QueueClosed,
        })
    }

    /// Events currently waiting for the consumer.
    pub fn depth(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    /// Maximum number of waiting events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns whether the consumer half is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Counts queued events and running pipelines so callers can wait for quiet.
#[derive(Debug, Default)]
pub(crate) struct Activity {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl Activity {
    pub(crate) fn enter(self: &Arc<Self>) -> ActivityGuard {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        ActivityGuard(Arc::clone(self))
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Resolves once no work is outstanding.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one unit of outstanding work until dropped.
#[derive(Debug)]
pub(crate) struct ActivityGuard(Arc<Activity>);

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
