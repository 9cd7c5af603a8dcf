//! Per-(event, endpoint) delivery status tracking.
//!
//! Pending deliveries live in an index keyed by event and endpoint. Once a
//! delivery reaches a terminal status it moves to a bounded history so
//! recent outcomes stay inspectable without unbounded growth.

use std::collections::{HashMap, VecDeque};

use herald_core::models::{DeliveryRecord, DeliveryStatus, EndpointId, EventId};
use tokio::sync::RwLock;

/// Default number of finished deliveries kept for inspection.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct TrackerState {
    active: HashMap<(EventId, EndpointId), DeliveryRecord>,
    history: VecDeque<DeliveryRecord>,
}

/// Delivery status store shared by pipelines and the operator API.
#[derive(Debug)]
pub struct DeliveryTracker {
    state: RwLock<TrackerState>,
    history_capacity: usize,
}

impl DeliveryTracker {
    /// Creates a tracker keeping at most `history_capacity` finished records.
    pub fn new(history_capacity: usize) -> Self {
        Self { state: RwLock::new(TrackerState::default()), history_capacity }
    }

    /// Stores the latest state of a delivery.
    pub async fn upsert(&self, record: DeliveryRecord) {
        let key = (record.event_id, record.endpoint_id);
        let mut state = self.state.write().await;

        if !record.status.is_terminal() {
            state.active.insert(key, record);
            return;
        }

        state.active.remove(&key);
        if self.history_capacity == 0 {
            return;
        }
        while state.history.len() >= self.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(record);
    }

    /// Returns the record for one delivery, pending or finished.
    pub async fn get(&self, event_id: EventId, endpoint_id: EndpointId) -> Option<DeliveryRecord> {
        let state = self.state.read().await;
        state.active.get(&(event_id, endpoint_id)).cloned().or_else(|| {
            state
                .history
                .iter()
                .rev()
                .find(|r| r.event_id == event_id && r.endpoint_id == endpoint_id)
                .cloned()
        })
    }

    /// Returns every known delivery of an event.
    pub async fn deliveries_for(&self, event_id: EventId) -> Vec<DeliveryRecord> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .history
            .iter()
            .chain(state.active.values())
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.updated_at);
        records
    }

    /// Number of deliveries still pending.
    pub async fn pending_count(&self) -> usize {
        self.state.read().await.active.len()
    }

    /// Counts finished deliveries in history by status.
    pub async fn count_finished(&self, status: DeliveryStatus) -> usize {
        self.state.read().await.history.iter().filter(|r| r.status == status).count()
    }
}

impl Default for DeliveryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
