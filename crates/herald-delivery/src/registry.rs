//! In-memory endpoint registry.
//!
//! Holds every registered endpoint in registration order behind a
//! `tokio::sync::RwLock`: lookups run concurrently, registrations and
//! removals are serialized. Each entry owns a cancellation token that fires
//! when the endpoint is deregistered, so delivery pipelines waiting on backoff
//! for that endpoint stop early.

use std::sync::Arc;

use herald_core::{
    error::{CoreError, Result},
    models::{Endpoint, EndpointId, SigningSecret},
    time::Clock,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
struct EndpointEntry {
    endpoint: Endpoint,
    removed: CancellationToken,
}

/// Endpoint snapshot paired with the token cancelled on its removal.
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    /// Endpoint state at fan-out time.
    pub endpoint: Endpoint,
    /// Cancelled when the endpoint is deregistered.
    pub removed: CancellationToken,
}

/// Registry of webhook endpoints.
///
/// Injected into the dispatcher and the HTTP API as an `Arc`; there is no
/// process-wide instance.
#[derive(Debug)]
pub struct EndpointRegistry {
    entries: RwLock<Vec<EndpointEntry>>,
    clock: Arc<dyn Clock>,
}

impl EndpointRegistry {
    /// Creates an empty registry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { entries: RwLock::new(Vec::new()), clock }
    }

    /// Registers an endpoint and returns its new ID.
    ///
    /// Generates a secret when none is supplied.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidEndpoint` when the URL is malformed, no
    /// event types are given or a subscription is not a valid type name.
    pub async fn register(
        &self,
        url: &str,
        event_types: Vec<String>,
        secret: Option<SigningSecret>,
    ) -> Result<EndpointId> {
        self.register_endpoint(url, event_types, secret).await.map(|endpoint| endpoint.id)
    }

    /// Registers an endpoint and returns the stored copy, secret included.
    pub async fn register_endpoint(
        &self,
        url: &str,
        event_types: Vec<String>,
        secret: Option<SigningSecret>,
    ) -> Result<Endpoint> {
        let endpoint = Endpoint::new(url, event_types, secret, self.clock.now_utc())?;

        let mut entries = self.entries.write().await;
        entries.push(EndpointEntry { endpoint: endpoint.clone(), removed: CancellationToken::new() });

        info!(
            endpoint_id = %endpoint.id,
            url = %endpoint.url,
            subscriptions = ?endpoint.subscribed_events,
            "Endpoint registered"
        );

        Ok(endpoint)
    }

    /// Removes an endpoint. Returns whether it existed.
    ///
    /// Pending retries for the endpoint are cancelled.
    pub async fn deregister(&self, endpoint_id: EndpointId) -> bool {
        let mut entries = self.entries.write().await;
        let Some(position) = entries.iter().position(|e| e.endpoint.id == endpoint_id) else {
            return false;
        };

        let entry = entries.remove(position);
        entry.removed.cancel();

        info!(endpoint_id = %endpoint_id, "Endpoint deregistered");
        true
    }

    /// Returns active endpoints subscribed to `event_type`, in registration
    /// order.
    pub async fn list_matching(&self, event_type: &str) -> Vec<Endpoint> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.endpoint.matches(event_type))
            .map(|e| e.endpoint.clone())
            .collect()
    }

    /// Enables or disables an endpoint. Returns whether it exists.
    ///
    /// Deliveries already fanned out to the endpoint continue either way.
    pub async fn set_active(&self, endpoint_id: EndpointId, active: bool) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.iter_mut().find(|e| e.endpoint.id == endpoint_id) else {
            return false;
        };

        entry.endpoint.active = active;
        debug!(endpoint_id = %endpoint_id, active, "Endpoint activation changed");
        true
    }

    /// Returns a copy of one endpoint.
    pub async fn get(&self, endpoint_id: EndpointId) -> Option<Endpoint> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.endpoint.id == endpoint_id)
            .map(|e| e.endpoint.clone())
    }

    /// Returns every endpoint in registration order.
    pub async fn list(&self) -> Vec<Endpoint> {
        self.entries.read().await.iter().map(|e| e.endpoint.clone()).collect()
    }

    /// Number of registered endpoints.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns whether no endpoints are registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Fan-out targets for a published event.
    pub(crate) async fn matching_targets(&self, event_type: &str) -> Vec<DeliveryTarget> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.endpoint.matches(event_type))
            .map(|e| DeliveryTarget { endpoint: e.endpoint.clone(), removed: e.removed.clone() })
            .collect()
    }

    /// Target for an explicitly addressed delivery, ignoring subscriptions
    /// and the active flag.
    pub(crate) async fn target(&self, endpoint_id: EndpointId) -> Option<DeliveryTarget> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.endpoint.id == endpoint_id)
            .map(|e| DeliveryTarget { endpoint: e.endpoint.clone(), removed: e.removed.clone() })
    }

    /// Returns `EndpointNotFound` unless the endpoint exists.
    pub async fn ensure_exists(&self, endpoint_id: EndpointId) -> Result<()> {
        if self.entries.read().await.iter().any(|e| e.endpoint.id == endpoint_id) {
            Ok(())
        } else {
            Err(CoreError::EndpointNotFound { id: endpoint_id })
        }
    }
}
