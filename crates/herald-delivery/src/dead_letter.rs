//! Bounded store of permanently failed deliveries.

use std::collections::VecDeque;

use herald_core::models::DeadLetter;
use tokio::sync::RwLock;
use tracing::warn;

/// Default number of dead letters kept before the oldest are evicted.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1024;

/// Dead letters in the order they failed.
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: RwLock<VecDeque<DeadLetter>>,
    capacity: usize,
}

impl DeadLetterQueue {
    /// Creates a queue holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self { entries: RwLock::new(VecDeque::new()), capacity }
    }

    /// Records a dead letter, evicting the oldest when full.
    pub async fn push(&self, dead_letter: DeadLetter) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                warn!(
                    event_id = %evicted.event_id,
                    endpoint_id = %evicted.endpoint_id,
                    "Dead letter evicted at capacity"
                );
            }
        }
        entries.push_back(dead_letter);
    }

    /// Returns all dead letters, oldest first.
    pub async fn list(&self) -> Vec<DeadLetter> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Removes and returns all dead letters.
    pub async fn drain(&self) -> Vec<DeadLetter> {
        self.entries.write().await.drain(..).collect()
    }

    /// Number of stored dead letters.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns whether no dead letters are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}
