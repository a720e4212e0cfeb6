//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`DomainEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the host application.

use chrono::{DateTime, Utc};
use postbox_core::EventTag;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// A domain event published by the host application.
///
/// Constructed via [`DomainEvent::new`] and enriched with the builder
/// methods [`with_actor`](DomainEvent::with_actor),
/// [`with_locale`](DomainEvent::with_locale) and
/// [`with_payload`](DomainEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event-type tag, e.g. `"order-confirmation"`.
    pub event_type: String,

    /// Correlation id shared by everything this event causes.
    pub correlation_id: Uuid,

    /// Optional identity of whoever triggered the event.
    pub actor: Option<String>,

    /// Optional locale of the originating request.
    pub locale: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    /// Create a new event with only the required `event_type`.
    ///
    /// A fresh correlation id is generated; optional fields default to
    /// `None` / empty object. Surrounding whitespace is trimmed from
    /// `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        let mut event_type: String = event_type.into();
        if event_type.trim().len() != event_type.len() {
            event_type = event_type.trim().to_string();
        }
        Self {
            event_type,
            correlation_id: Uuid::now_v7(),
            actor: None,
            locale: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the acting identity to the event.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Attach the originating locale to the event.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Reuse an upstream correlation id.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Event-type tag used to match handlers.
    ///
    /// Trimmed here as well, since `event_type` is public and events may
    /// arrive deserialized.
    pub fn tag(&self) -> &str {
        self.event_type.trim()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`DomainEvent`].
///
/// # Usage
///
/// ```rust
/// use postbox_events::bus::{DomainEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(DomainEvent::new("order.placed"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers the event reached. If there are no
    /// active subscribers the event is silently dropped.
    pub fn publish(&self, event: DomainEvent) -> usize {
        // A SendError only means there are zero receivers.
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events of a single type.
    ///
    /// The subscription is registered immediately, so events published
    /// after this call returns are never missed.
    pub fn subscribe_to(&self, tag: EventTag) -> EventSubscription {
        EventSubscription {
            tag,
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// EventSubscription
// ---------------------------------------------------------------------------

/// A bus receiver that only yields events of one type.
pub struct EventSubscription {
    tag: EventTag,
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventSubscription {
    pub fn tag(&self) -> &EventTag {
        &self.tag
    }

    /// Wait for the next matching event.
    ///
    /// Returns `None` once the bus has been dropped. A lagging receiver
    /// logs how many events it skipped and keeps going.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.tag() == self.tag.as_str() => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        event_type = %self.tag,
                        skipped = n,
                        "Event subscription lagged, some events were not dispatched"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
