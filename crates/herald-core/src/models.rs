//! Core domain models and strongly-typed identifiers.
//!
//! Defines registered endpoints, published events, the wire envelope and the
//! per-endpoint delivery records tracked while an event fans out. Newtype ID
//! wrappers keep event and endpoint identifiers from being mixed up.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Well-known event type names.
///
/// Producers may publish any name that passes [`validate_event_type`]; these
/// are the names the platform raises itself.
pub mod event_types {
    /// A new user account was created.
    pub const USER_REGISTERED: &str = "user.registered";
    /// A user profile changed.
    pub const USER_UPDATED: &str = "user.updated";
    /// An experience was published.
    pub const EXPERIENCE_CREATED: &str = "experience.created";
    /// An experience was edited.
    pub const EXPERIENCE_UPDATED: &str = "experience.updated";
    /// An experience was removed.
    pub const EXPERIENCE_DELETED: &str = "experience.deleted";
    /// A comment was posted.
    pub const COMMENT_CREATED: &str = "comment.created";
    /// A user unlocked an achievement.
    pub const ACHIEVEMENT_UNLOCKED: &str = "achievement.unlocked";
    /// A direct message was sent.
    pub const MESSAGE_SENT: &str = "message.sent";
    /// Synthetic event used to verify an endpoint.
    pub const WEBHOOK_TEST: &str = "webhook.test";

    /// Subscription entry matching every event type.
    pub const WILDCARD: &str = "*";

    /// All predefined event types.
    pub const ALL: &[&str] = &[
        USER_REGISTERED,
        USER_UPDATED,
        EXPERIENCE_CREATED,
        EXPERIENCE_UPDATED,
        EXPERIENCE_DELETED,
        COMMENT_CREATED,
        ACHIEVEMENT_UNLOCKED,
        MESSAGE_SENT,
        WEBHOOK_TEST,
    ];
}

const MAX_EVENT_TYPE_LEN: usize = 128;

/// Strongly-typed event identifier.
///
/// Assigned once at publish time and carried unchanged in every delivery
/// attempt to every endpoint, so receivers can deduplicate on it.
///
/// # Example
///
/// ```
/// use herald_core::models::EventId;
/// let event_id = EventId::new();
/// println!("Publishing event: {}", event_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed endpoint identifier.
///
/// Generated when an endpoint is registered and used for every later
/// operation on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub Uuid);

impl EndpointId {
    /// Creates a new random endpoint ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EndpointId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Shared secret used to sign payloads for one endpoint.
///
/// Never transmitted with a delivery. `Debug` output is redacted so secrets
/// do not leak into logs.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// Generates a fresh secret from 32 bytes of OS randomness, hex-encoded.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Wraps a caller-supplied secret, rejecting empty values.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    /// Returns the secret as key bytes for HMAC.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns the secret text. Only for handing back to the registrant.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(***)")
    }
}

/// Validates an event type name.
///
/// Names are lowercase ASCII letters, digits, `_` and `-`, grouped into
/// non-empty segments separated by `.`, at most 128 characters long.
pub fn validate_event_type(event_type: &str) -> Result<()> {
    if event_type.is_empty() {
        return Err(CoreError::invalid_event_type(event_type, "event type must not be empty"));
    }

    if event_type.len() > MAX_EVENT_TYPE_LEN {
        return Err(CoreError::invalid_event_type(
            event_type,
            format!("event type exceeds {MAX_EVENT_TYPE_LEN} characters"),
        ));
    }

    if event_type.split('.').any(str::is_empty) {
        return Err(CoreError::invalid_event_type(event_type, "empty segment"));
    }

    if let Some(c) = event_type
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')))
    {
        return Err(CoreError::invalid_event_type(
            event_type,
            format!("unsupported character {c:?}"),
        ));
    }

    Ok(())
}

/// Validates that an endpoint URL is well-formed.
///
/// Only structure is checked: the URL must be absolute, use `http` or `https`
/// and name a host. Reachability is discovered at delivery time.
pub fn validate_endpoint_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| CoreError::invalid_endpoint(raw, format!("invalid URL format: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {},
        scheme => {
            return Err(CoreError::invalid_endpoint(
                raw,
                format!("unsupported URL scheme: {scheme}"),
            ));
        },
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(CoreError::invalid_endpoint(raw, "URL must have a host"));
    }

    Ok(parsed)
}

/// Registered webhook destination.
///
/// Created by registration, mutated only by activation toggles and removed by
/// deregistration. The secret is skipped when serializing.
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    /// Unique identifier for this endpoint.
    pub id: EndpointId,

    /// Destination URL receiving POST requests.
    pub url: String,

    /// Event types this endpoint receives. `"*"` matches every type.
    pub subscribed_events: Vec<String>,

    /// Key used to sign every payload sent to this endpoint.
    #[serde(skip)]
    pub secret: SigningSecret,

    /// Inactive endpoints keep their registration but receive nothing new.
    pub active: bool,

    /// When the endpoint was registered.
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    /// Builds a validated endpoint.
    ///
    /// Generates a secret when none is supplied. Fails when the URL is
    /// malformed, when no event types are given or when any subscription is
    /// neither `"*"` nor a valid event type.
    pub fn new(
        url: &str,
        event_types: Vec<String>,
        secret: Option<SigningSecret>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        validate_endpoint_url(url)?;

        if event_types.is_empty() {
            return Err(CoreError::invalid_endpoint(url, "at least one event type is required"));
        }

        for event_type in &event_types {
            if event_type != event_types::WILDCARD {
                validate_event_type(event_type).map_err(|e| {
                    CoreError::invalid_endpoint(url, format!("invalid subscription: {e}"))
                })?;
            }
        }

        let mut subscribed_events = Vec::with_capacity(event_types.len());
        for event_type in event_types {
            if !subscribed_events.contains(&event_type) {
                subscribed_events.push(event_type);
            }
        }

        Ok(Self {
            id: EndpointId::new(),
            url: url.to_string(),
            subscribed_events,
            secret: secret.unwrap_or_else(SigningSecret::generate),
            active: true,
            created_at,
        })
    }

    /// Returns whether this endpoint's subscriptions include `event_type`.
    ///
    /// Ignores the active flag.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.subscribed_events.iter().any(|s| s == event_types::WILDCARD || s == event_type)
    }

    /// Returns whether a newly published `event_type` should fan out here.
    pub fn matches(&self, event_type: &str) -> bool {
        self.active && self.subscribes_to(event_type)
    }
}

/// Domain event published by the application.
///
/// Immutable once created. The same `id` and `created_at` are sent in every
/// attempt to every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event.
    pub id: EventId,

    /// Event type name, e.g. `user.registered`.
    pub event_type: String,

    /// Structured payload delivered as `data`.
    pub payload: serde_json::Value,

    /// When the event was published.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event after validating its type.
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let event_type = event_type.into();
        validate_event_type(&event_type)?;
        Ok(Self { id: EventId::new(), event_type, payload, created_at })
    }

    /// Synthesizes the `webhook.test` event sent by an endpoint test.
    pub fn test(endpoint_id: EndpointId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_types::WEBHOOK_TEST.to_string(),
            payload: serde_json::json!({
                "endpoint_id": endpoint_id,
                "message": "This is a test webhook delivery",
            }),
            created_at,
        }
    }

    /// Builds the wire envelope for this event.
    pub fn envelope(&self) -> Envelope<'_> {
        Envelope {
            id: self.id,
            event: &self.event_type,
            data: &self.payload,
            timestamp: self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// JSON body of every delivery request.
///
/// Field order is fixed so the serialized bytes, and therefore the signature,
/// are identical for every attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    /// Event identifier.
    pub id: EventId,
    /// Event type name.
    pub event: &'a str,
    /// Event payload.
    pub data: &'a serde_json::Value,
    /// Publish time, RFC 3339 with millisecond precision.
    pub timestamp: String,
}

impl Envelope<'_> {
    /// Serializes the envelope into the exact bytes placed on the wire.
    pub fn to_bytes(&self) -> std::result::Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Delivery status of one (event, endpoint) pair.
///
/// ```text
/// Pending -> Delivered
///         -> Failed     (attempts exhausted)
///         -> Cancelled  (endpoint deregistered or engine shut down)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Attempts remain; either in flight or waiting for backoff.
    Pending,

    /// An attempt received a 2xx response.
    Delivered,

    /// Every allowed attempt failed.
    Failed,

    /// Retries stopped before exhaustion.
    Cancelled,
}

impl DeliveryStatus {
    /// Returns whether no further attempts will be made.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Progress of one event towards one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Event being delivered.
    pub event_id: EventId,

    /// Destination endpoint.
    pub endpoint_id: EndpointId,

    /// Event type, kept for diagnostics.
    pub event_type: String,

    /// Current status.
    pub status: DeliveryStatus,

    /// Attempts made so far.
    pub attempt_count: u32,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    /// When the next attempt becomes eligible, while awaiting backoff.
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// Last time this record changed.
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Creates a pending record with no attempts.
    pub fn pending(event: &Event, endpoint_id: EndpointId, now: DateTime<Utc>) -> Self {
        Self {
            event_id: event.id,
            endpoint_id,
            event_type: event.event_type.clone(),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: None,
            updated_at: now,
        }
    }
}

/// Permanent delivery failure kept for operator inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Endpoint that never accepted the event.
    pub endpoint_id: EndpointId,

    /// URL the attempts were sent to.
    pub endpoint_url: String,

    /// Event that could not be delivered.
    pub event_id: EventId,

    /// Type of the undelivered event.
    pub event_type: String,

    /// Error from the final attempt.
    pub last_error: String,

    /// Total attempts made.
    pub attempts: u32,

    /// When the delivery was given up.
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    fn endpoint(event_types: &[&str]) -> Endpoint {
        Endpoint::new(
            "https://example.com/hooks",
            event_types.iter().map(|s| s.to_string()).collect(),
            None,
            created_at(),
        )
        .unwrap()
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
        assert_ne!(EndpointId::new(), EndpointId::new());
    }

    #[test]
    fn predefined_event_types_are_valid() {
        for event_type in event_types::ALL {
            assert!(validate_event_type(event_type).is_ok(), "{event_type} should be valid");
        }
    }

    #[test]
    fn malformed_event_types_are_rejected() {
        for bad in ["", ".user", "user.", "user..registered", "User.Registered", "user registered", "*"] {
            assert!(validate_event_type(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_event_type(&"a".repeat(129)).is_err());
    }

    #[test]
    fn endpoint_url_must_be_absolute_http() {
        assert!(validate_endpoint_url("https://example.com/hook").is_ok());
        assert!(validate_endpoint_url("http://127.0.0.1:8080/hook").is_ok());

        for bad in ["not a url", "/relative/path", "ftp://example.com/hook", "mailto:ops@example.com"] {
            let err = validate_endpoint_url(bad).unwrap_err();
            assert_eq!(err.code(), "E1001", "{bad:?} should be rejected");
        }
    }

    #[test]
    fn endpoint_requires_subscriptions() {
        let err = Endpoint::new("https://example.com", vec![], None, created_at()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEndpoint { .. }));

        let err =
            Endpoint::new("https://example.com", vec!["Bad Type".into()], None, created_at())
                .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEndpoint { .. }));
    }

    #[test]
    fn endpoint_generates_secret_when_missing() {
        let a = endpoint(&["user.registered"]);
        let b = endpoint(&["user.registered"]);

        assert_eq!(a.secret.expose().len(), 64);
        assert_ne!(a.secret, b.secret);
        assert!(a.active);
    }

    #[test]
    fn endpoint_keeps_supplied_secret() {
        let secret = SigningSecret::new("whsec_test").unwrap();
        let endpoint = Endpoint::new(
            "https://example.com",
            vec!["user.registered".into()],
            Some(secret.clone()),
            created_at(),
        )
        .unwrap();

        assert_eq!(endpoint.secret, secret);
        assert!(SigningSecret::new("").is_none());
    }

    #[test]
    fn duplicate_subscriptions_collapse() {
        let endpoint = endpoint(&["user.registered", "user.registered", "message.sent"]);
        assert_eq!(endpoint.subscribed_events, vec!["user.registered", "message.sent"]);
    }

    #[test]
    fn wildcard_subscription_matches_everything() {
        let endpoint = endpoint(&["*"]);
        assert!(endpoint.matches("user.registered"));
        assert!(endpoint.matches("anything.else"));
    }

    #[test]
    fn inactive_endpoint_never_matches() {
        let mut endpoint = endpoint(&["user.registered"]);
        endpoint.active = false;

        assert!(endpoint.subscribes_to("user.registered"));
        assert!(!endpoint.matches("user.registered"));
        assert!(!endpoint.matches("message.sent"));
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let secret = SigningSecret::new("super-secret").unwrap();
        assert_eq!(format!("{secret:?}"), "SigningSecret(***)");

        let endpoint = endpoint(&["*"]);
        let rendered = format!("{endpoint:?}");
        assert!(!rendered.contains(endpoint.secret.expose()));

        let serialized = serde_json::to_value(&endpoint).unwrap();
        assert!(serialized.get("secret").is_none());
    }

    #[test]
    fn envelope_has_fixed_field_order() {
        let event = Event::new("user.registered", json!({"user_id": "u1"}), created_at()).unwrap();
        let bytes = event.envelope().to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        let expected = format!(
            r#"{{"id":"{}","event":"user.registered","data":{{"user_id":"u1"}},"timestamp":"2024-05-01T12:30:00.000Z"}}"#,
            event.id
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn envelope_bytes_are_stable_across_calls() {
        let event = Event::new("comment.created", json!({"b": 2, "a": 1}), created_at()).unwrap();
        assert_eq!(event.envelope().to_bytes().unwrap(), event.envelope().to_bytes().unwrap());
    }

    #[test]
    fn test_event_targets_endpoint() {
        let endpoint_id = EndpointId::new();
        let event = Event::test(endpoint_id, created_at());

        assert_eq!(event.event_type, event_types::WEBHOOK_TEST);
        assert_eq!(event.payload["endpoint_id"], json!(endpoint_id.0.to_string()));
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(DeliveryStatus::Cancelled.is_terminal());
        assert_eq!(DeliveryStatus::Cancelled.to_string(), "cancelled");
    }
}
