//! Event ingestion.
//!
//! Lets services outside the process feed the notification pipeline by
//! publishing onto the shared [`EventBus`](postbox_events::EventBus).

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use postbox_core::EventTag;
use postbox_events::DomainEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/events`.
#[derive(Debug, Deserialize)]
pub struct PublishEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Reuse an upstream correlation id instead of minting one.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PublishedEvent {
    pub event_type: String,
    pub correlation_id: Uuid,
    /// Number of live bus subscribers that received the event.
    pub subscribers: usize,
}

/// POST /api/v1/events -- validate and publish a domain event.
async fn publish_event(
    State(state): State<AppState>,
    Json(input): Json<PublishEventRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<PublishedEvent>>)> {
    let tag = EventTag::parse(&input.event_type)?;

    let mut event = DomainEvent::new(tag.as_str());
    if let Some(payload) = input.payload {
        if !payload.is_object() {
            return Err(AppError::BadRequest(
                "payload must be a JSON object".to_string(),
            ));
        }
        event = event.with_payload(payload);
    }
    if let Some(actor) = input.actor {
        event = event.with_actor(actor);
    }
    if let Some(locale) = input.locale {
        event = event.with_locale(locale);
    }
    if let Some(correlation_id) = input.correlation_id {
        event = event.with_correlation_id(correlation_id);
    }

    let correlation_id = event.correlation_id;
    let subscribers = state.event_bus.publish(event);
    tracing::debug!(event_type = %tag, %correlation_id, subscribers, "Event published");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: PublishedEvent {
                event_type: tag.to_string(),
                correlation_id,
                subscribers,
            },
        }),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(publish_event))
}
