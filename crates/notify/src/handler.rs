//! Handler definitions.
//!
//! A [`HandlerDefinition`] binds one event type to the logic that decides
//! whether (and what) to send. Its [`HandlerKind`] is an explicit tag chosen
//! at construction:
//!
//! - [`HandlerKind::Simple`] wraps an [`EventHandler`] that works from the
//!   event alone.
//! - [`HandlerKind::WithAsyncData`] wraps an [`EnrichedEventHandler`] whose
//!   loader runs first; the body then receives an [`EventEnvelope`] carrying
//!   the loaded data.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use postbox_core::{EventTag, GlobalVars, NotificationPayload};
use postbox_events::DomainEvent;

use crate::error::{BootstrapError, HandlerError};
use crate::loader::{self, DataContext, Injector};

/// What a handler body returns: a payload to deliver, or `None` to stay
/// silent for this event.
pub type HandlerResult = Result<Option<NotificationPayload>, HandlerError>;

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// Handler that needs nothing beyond the event itself.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent, globals: &GlobalVars) -> HandlerResult;
}

/// Handler that loads data asynchronously before its body runs.
#[async_trait]
pub trait EnrichedEventHandler: Send + Sync {
    /// Data produced by the loader and handed to the body.
    type Data: Send + Sync + 'static;

    /// Produce the enrichment data. Awaited to completion before
    /// [`handle`](Self::handle) is called.
    async fn load_data(&self, ctx: &DataContext<'_>) -> Result<Self::Data, HandlerError>;

    async fn handle(
        &self,
        envelope: &EventEnvelope<'_, Self::Data>,
        globals: &GlobalVars,
    ) -> HandlerResult;
}

/// An event together with the data its handler's loader produced.
///
/// Only ever built after the loader succeeded; both parts are read-only.
pub struct EventEnvelope<'a, D> {
    event: &'a DomainEvent,
    data: D,
}

impl<'a, D> EventEnvelope<'a, D> {
    pub fn event(&self) -> &'a DomainEvent {
        self.event
    }

    pub fn data(&self) -> &D {
        &self.data
    }
}

/// Object-safe form of an [`EnrichedEventHandler`]: load, then handle.
#[async_trait]
pub trait AsyncDataStage: Send + Sync {
    async fn run(
        &self,
        event: &DomainEvent,
        injector: &dyn Injector,
        globals: &GlobalVars,
    ) -> HandlerResult;
}

struct WithAsyncData<H>(H);

#[async_trait]
impl<H> AsyncDataStage for WithAsyncData<H>
where
    H: EnrichedEventHandler,
{
    async fn run(
        &self,
        event: &DomainEvent,
        injector: &dyn Injector,
        globals: &GlobalVars,
    ) -> HandlerResult {
        let data = loader::load(&self.0, event, injector).await?;
        let envelope = EventEnvelope { event, data };
        self.0.handle(&envelope, globals).await
    }
}

// ---------------------------------------------------------------------------
// Closure handlers
// ---------------------------------------------------------------------------

/// [`EventHandler`] backed by a synchronous closure.
pub struct FnHandler<F>(F);

/// Wrap a closure as a simple handler.
///
/// ```rust
/// use postbox_core::NotificationPayload;
/// use postbox_notify::handler::handler_fn;
///
/// let handler = handler_fn(|event, _globals| {
///     let to = event.payload["email"].as_str().unwrap_or_default();
///     Ok(Some(NotificationPayload::new(to, "confirm")))
/// });
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&DomainEvent, &GlobalVars) -> HandlerResult + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&DomainEvent, &GlobalVars) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, event: &DomainEvent, globals: &GlobalVars) -> HandlerResult {
        (self.0)(event, globals)
    }
}

// ---------------------------------------------------------------------------
// HandlerDefinition
// ---------------------------------------------------------------------------

/// How a handler runs, decided when it is registered.
#[derive(Clone)]
pub enum HandlerKind {
    Simple(Arc<dyn EventHandler>),
    WithAsyncData(Arc<dyn AsyncDataStage>),
}

impl HandlerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple(_) => "simple",
            Self::WithAsyncData(_) => "with_async_data",
        }
    }
}

/// A handler bound to one event type.
#[derive(Clone)]
pub struct HandlerDefinition {
    id: String,
    event_type: EventTag,
    kind: HandlerKind,
}

impl HandlerDefinition {
    /// Define a handler that needs no loaded data.
    ///
    /// Fails at bootstrap if `event_type` is malformed.
    pub fn simple<H>(
        id: impl Into<String>,
        event_type: &str,
        handler: H,
    ) -> Result<Self, BootstrapError>
    where
        H: EventHandler + 'static,
    {
        Self::new(id.into(), event_type, HandlerKind::Simple(Arc::new(handler)))
    }

    /// Define a handler whose loader runs before its body.
    pub fn with_async_data<H>(
        id: impl Into<String>,
        event_type: &str,
        handler: H,
    ) -> Result<Self, BootstrapError>
    where
        H: EnrichedEventHandler + 'static,
    {
        Self::new(
            id.into(),
            event_type,
            HandlerKind::WithAsyncData(Arc::new(WithAsyncData(handler))),
        )
    }

    fn new(id: String, event_type: &str, kind: HandlerKind) -> Result<Self, BootstrapError> {
        if id.trim().is_empty() {
            return Err(BootstrapError::InvalidConfig(format!(
                "handler for '{event_type}' has an empty id"
            )));
        }
        let event_type = EventTag::parse(event_type)?;
        Ok(Self {
            id,
            event_type,
            kind,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &EventTag {
        &self.event_type
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    /// Whether a loader runs before the body.
    pub fn has_loader(&self) -> bool {
        matches!(self.kind, HandlerKind::WithAsyncData(_))
    }

    /// Run the loader (if any) and the body for `event`.
    pub async fn invoke(
        &self,
        event: &DomainEvent,
        injector: &dyn Injector,
        globals: &GlobalVars,
    ) -> HandlerResult {
        match &self.kind {
            HandlerKind::Simple(handler) => handler.handle(event, globals).await,
            HandlerKind::WithAsyncData(stage) => stage.run(event, injector, globals).await,
        }
    }
}

impl fmt::Debug for HandlerDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDefinition")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("kind", &self.kind.name())
            .finish()
    }
}
