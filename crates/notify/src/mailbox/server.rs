//! HTTP surface of the dev mailbox.
//!
//! | Method   | Path                 | Purpose                              |
//! |----------|----------------------|--------------------------------------|
//! | `GET`    | `/`                  | list captured payloads               |
//! | `DELETE` | `/`                  | clear the mailbox                    |
//! | `GET`    | `/entries/{id}`      | one captured payload in full         |
//! | `GET`    | `/handlers`          | registered handlers                  |
//! | `POST`   | `/mock/{handler_id}` | run a synthetic event for a handler  |

use std::sync::{Arc, PoisonError};

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use postbox_events::DomainEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::{MailboxError, SinkSlot};
use crate::dispatcher::HandlerSummary;
use crate::mailbox::store::{EntrySummary, MailboxEntry, MailboxStore};
use crate::registry::HandlerRegistry;

#[derive(Clone)]
pub(super) struct MailboxState {
    pub store: Arc<MailboxStore>,
    pub registry: Arc<HandlerRegistry>,
    pub sink: SinkSlot,
}

pub(super) fn router(state: MailboxState) -> Router {
    Router::new()
        .route("/", get(list_entries).delete(clear_entries))
        .route("/entries/{id}", get(get_entry))
        .route("/handlers", get(list_handlers))
        .route("/mock/{handler_id}", post(mock_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub id: String,
    pub event_type: String,
    pub kind: &'static str,
    pub has_loader: bool,
}

/// Body of `POST /mock/{handler_id}`. Every field is optional, and the body
/// itself may be omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct MockEventRequest {
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

impl Default for MockEventRequest {
    fn default() -> Self {
        Self {
            payload: empty_object(),
            actor: None,
            locale: None,
        }
    }
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Clone, Serialize)]
pub struct MockEventResponse {
    pub event_type: String,
    pub correlation_id: Uuid,
    pub result: HandlerSummary,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_entries(State(state): State<MailboxState>) -> Json<Vec<EntrySummary>> {
    Json(state.store.summaries())
}

async fn clear_entries(State(state): State<MailboxState>) -> Json<Value> {
    let cleared = state.store.clear();
    tracing::debug!(cleared, "Dev mailbox cleared");
    Json(json!({ "cleared": cleared }))
}

async fn get_entry(
    State(state): State<MailboxState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MailboxEntry>, MailboxError> {
    state
        .store
        .get(id)
        .map(Json)
        .ok_or(MailboxError::EntryNotFound(id))
}

async fn list_handlers(State(state): State<MailboxState>) -> Json<Vec<HandlerInfo>> {
    let handlers = state
        .registry
        .iter()
        .map(|h| HandlerInfo {
            id: h.id().to_string(),
            event_type: h.event_type().to_string(),
            kind: h.kind().name(),
            has_loader: h.has_loader(),
        })
        .collect();
    Json(handlers)
}

async fn mock_event(
    State(state): State<MailboxState>,
    Path(handler_id): Path<String>,
    request: Option<Json<MockEventRequest>>,
) -> Result<Json<MockEventResponse>, MailboxError> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let handler = state
        .registry
        .get(&handler_id)
        .cloned()
        .ok_or_else(|| MailboxError::HandlerNotFound(handler_id.clone()))?;

    let sink = state
        .sink
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(MailboxError::MockUnavailable)?;

    let mut event = DomainEvent::new(handler.event_type().as_str()).with_payload(request.payload);
    event.actor = request.actor;
    event.locale = request.locale;

    tracing::info!(
        handler = %handler_id,
        event_type = %event.event_type,
        correlation_id = %event.correlation_id,
        "Dispatching mock event"
    );
    let report = sink.dispatch_to(&handler, &event).await;

    Ok(Json(MockEventResponse {
        event_type: event.event_type,
        correlation_id: event.correlation_id,
        result: report.summary(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
