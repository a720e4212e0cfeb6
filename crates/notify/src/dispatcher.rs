//! Event dispatcher.
//!
//! [`EventDispatcher`] owns one bus subscription per distinct event type in
//! the registry. Every received event becomes its own dispatch chain on a
//! [`TaskTracker`]; inside a chain, the handlers for that type run one after
//! another in registration order, each as loader → body → delivery.
//!
//! Failures (errors and panics alike) are contained per handler invocation:
//! they are logged, reported as [`HandlerOutcome::Failed`], and the next
//! handler or event proceeds as usual.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use postbox_core::GlobalVars;
use postbox_events::{DomainEvent, EventBus, EventSubscription};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use crate::delivery::{DeliveryContext, DeliveryReceipt, DeliveryRouter};
use crate::error::DispatchError;
use crate::handler::HandlerDefinition;
use crate::loader::Injector;
use crate::mailbox::MockEventSink;
use crate::registry::HandlerRegistry;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum HandlerOutcome {
    /// The handler produced a payload and the router accepted it.
    Delivered(DeliveryReceipt),
    /// The handler decided not to notify for this event.
    Skipped,
    Failed(DispatchError),
}

/// Result of one handler invocation.
#[derive(Debug)]
pub struct HandlerReport {
    pub handler_id: String,
    pub outcome: HandlerOutcome,
}

impl HandlerReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, HandlerOutcome::Delivered(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, HandlerOutcome::Failed(_))
    }

    /// Take the delivery receipt, e.g. to await a queued job.
    pub fn into_receipt(self) -> Option<DeliveryReceipt> {
        match self.outcome {
            HandlerOutcome::Delivered(receipt) => Some(receipt),
            _ => None,
        }
    }

    pub fn summary(&self) -> HandlerSummary {
        let (outcome, job_id, error) = match &self.outcome {
            HandlerOutcome::Delivered(receipt) => ("delivered", receipt.job_id(), None),
            HandlerOutcome::Skipped => ("skipped", None, None),
            HandlerOutcome::Failed(e) => ("failed", None, Some(e.to_string())),
        };
        HandlerSummary {
            handler_id: self.handler_id.clone(),
            outcome,
            job_id,
            error,
        }
    }
}

/// Serializable view of a [`HandlerReport`].
#[derive(Debug, Clone, Serialize)]
pub struct HandlerSummary {
    pub handler_id: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Results of every handler that ran for one event.
#[derive(Debug)]
pub struct DispatchReport {
    pub event_type: String,
    pub correlation_id: Uuid,
    pub handlers: Vec<HandlerReport>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.handlers.len() - self.delivered() - self.failed()
    }
}

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

pub struct EventDispatcher {
    registry: Arc<HandlerRegistry>,
    router: Arc<DeliveryRouter>,
    injector: Arc<dyn Injector>,
    globals: Arc<GlobalVars>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        router: Arc<DeliveryRouter>,
        injector: Arc<dyn Injector>,
        globals: Arc<GlobalVars>,
    ) -> Self {
        Self {
            registry,
            router,
            injector,
            globals,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<DeliveryRouter> {
        &self.router
    }

    /// Subscribe once per distinct event type and start listening.
    ///
    /// All subscriptions exist when this returns, so events published
    /// afterwards are dispatched. Returns the number of subscriptions.
    pub fn start(self: &Arc<Self>, bus: &EventBus) -> usize {
        let mut count = 0;
        for tag in self.registry.event_types() {
            let subscription = bus.subscribe_to(tag.clone());
            self.tasks.spawn(Arc::clone(self).listen(subscription));
            count += 1;
        }

        tracing::info!(
            subscriptions = count,
            handlers = self.registry.len(),
            mode = %self.router.mode(),
            "Event dispatcher started"
        );
        count
    }

    /// Receive events for one type until shut down or the bus closes.
    async fn listen(self: Arc<Self>, mut subscription: EventSubscription) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = subscription.recv() => match next {
                    Some(event) => event,
                    None => {
                        tracing::info!(
                            event_type = %subscription.tag(),
                            "Event bus closed, subscription ending"
                        );
                        break;
                    }
                },
            };

            let this = Arc::clone(&self);
            self.tasks.spawn(async move {
                this.dispatch(&event).await;
            });
        }
    }

    /// Run every handler registered for `event`'s type, in order.
    pub async fn dispatch(&self, event: &DomainEvent) -> DispatchReport {
        let handlers = self.registry.by_event_type(event.tag());
        if handlers.is_empty() {
            tracing::debug!(event_type = %event.event_type, "No handlers for event type");
        }

        let mut reports = Vec::with_capacity(handlers.len());
        for handler in handlers {
            reports.push(self.handle_event(handler, event).await);
        }

        DispatchReport {
            event_type: event.event_type.clone(),
            correlation_id: event.correlation_id,
            handlers: reports,
        }
    }

    /// Run one handler for one event: loader (if any), body, delivery.
    ///
    /// Never fails and never panics; problems end up in the report.
    pub async fn handle_event(
        &self,
        handler: &HandlerDefinition,
        event: &DomainEvent,
    ) -> HandlerReport {
        let span = tracing::info_span!(
            "dispatch",
            handler = handler.id(),
            event_type = %event.event_type,
            correlation_id = %event.correlation_id,
        );

        let result = AssertUnwindSafe(self.run_chain(handler, event))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| Err(DispatchError::Panicked(panic_message(&*panic))));

        let outcome = match result {
            Ok(Some(receipt)) => HandlerOutcome::Delivered(receipt),
            Ok(None) => HandlerOutcome::Skipped,
            Err(e) => {
                span.in_scope(|| {
                    tracing::error!(error = %e, details = ?e, "Event handler failed");
                });
                HandlerOutcome::Failed(e)
            }
        };

        HandlerReport {
            handler_id: handler.id().to_string(),
            outcome,
        }
    }

    async fn run_chain(
        &self,
        handler: &HandlerDefinition,
        event: &DomainEvent,
    ) -> Result<Option<DeliveryReceipt>, DispatchError> {
        let payload = handler
            .invoke(event, self.injector.as_ref(), &self.globals)
            .await?;

        let Some(mut payload) = payload else {
            tracing::debug!("Handler returned no payload");
            return Ok(None);
        };
        payload
            .event_type
            .get_or_insert_with(|| event.event_type.clone());

        let ctx = DeliveryContext {
            handler_id: handler.id(),
            event_type: &event.event_type,
            correlation_id: event.correlation_id,
        };
        let receipt = self.router.deliver(&ctx, payload).await?;

        tracing::info!(mode = %self.router.mode(), job_id = ?receipt.job_id(), "Notification delivered");
        Ok(Some(receipt))
    }

    /// Stop listening without waiting for in-flight chains.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop listening and wait for in-flight chains to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("Event dispatcher stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[async_trait]
impl MockEventSink for EventDispatcher {
    async fn dispatch_to(&self, handler: &HandlerDefinition, event: &DomainEvent) -> HandlerReport {
        self.handle_event(handler, event).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
