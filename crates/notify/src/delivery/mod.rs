//! Delivery routing for handler payloads.
//!
//! A [`DeliveryRouter`] is built once at bootstrap for exactly one
//! [`DeliveryMode`] and never changes afterwards:
//!
//! - **Queued**: the payload becomes a job on a [`JobQueue`]; a worker
//!   processes it asynchronously. The returned [`JobTicket`] resolves when the
//!   job reaches a terminal state.
//! - **Inline**: the payload is rendered and sent before `deliver` returns,
//!   so tests can assert right after dispatching.
//! - **Dev**: inline processing into a local sink, with the dev mailbox
//!   observing every payload.
//!
//! Observers see each payload before the backend does. They are
//! best-effort and cannot fail or delay delivery.

pub mod queue;
pub mod worker;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use postbox_core::NotificationPayload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BootstrapError, DeliveryError};
use crate::processor::{PayloadProcessor, ProcessOutcome};

pub use queue::{Job, JobError, JobProcessor, JobQueue, JobState, JobTicket, QueueStats};
pub use worker::{ChannelWorker, QueueForwarder, WorkerError, WorkerHandle, WorkerMessage, WorkerMessaging};

// ---------------------------------------------------------------------------
// DeliveryMode
// ---------------------------------------------------------------------------

/// Process-wide delivery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Queued,
    Inline,
    Dev,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Inline => "inline",
            Self::Dev => "dev",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" | "queue" => Ok(Self::Queued),
            "inline" | "direct" => Ok(Self::Inline),
            "dev" | "devmode" => Ok(Self::Dev),
            other => Err(BootstrapError::InvalidConfig(format!(
                "unknown delivery mode '{other}' (expected queued, inline or dev)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Where a payload came from.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryContext<'a> {
    pub handler_id: &'a str,
    pub event_type: &'a str,
    pub correlation_id: Uuid,
}

/// Sees every payload before it is delivered.
///
/// Implementations must return quickly and must not fail.
pub trait DeliveryObserver: Send + Sync {
    fn observe(&self, ctx: &DeliveryContext<'_>, payload: &NotificationPayload);
}

// ---------------------------------------------------------------------------
// DeliveryRouter
// ---------------------------------------------------------------------------

/// Result of a successful hand-off.
#[derive(Debug)]
pub enum DeliveryReceipt {
    /// The payload is a queue job; await the ticket for its outcome.
    Queued(JobTicket),
    /// The payload was processed before `deliver` returned.
    Processed(ProcessOutcome),
}

impl DeliveryReceipt {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            Self::Queued(ticket) => Some(ticket.job_id()),
            Self::Processed(_) => None,
        }
    }
}

enum Backend {
    Queue(JobQueue),
    Inline(Arc<dyn PayloadProcessor>),
}

/// Routes payloads to the backend selected at bootstrap.
pub struct DeliveryRouter {
    mode: DeliveryMode,
    backend: Backend,
    observers: Vec<Arc<dyn DeliveryObserver>>,
}

impl DeliveryRouter {
    pub fn queued(queue: JobQueue) -> Self {
        Self::new(DeliveryMode::Queued, Backend::Queue(queue))
    }

    pub fn inline(processor: Arc<dyn PayloadProcessor>) -> Self {
        Self::new(DeliveryMode::Inline, Backend::Inline(processor))
    }

    /// Inline processing labelled as dev mode. `processor` is expected to
    /// write to a local sink rather than a real transport.
    pub fn dev(processor: Arc<dyn PayloadProcessor>) -> Self {
        Self::new(DeliveryMode::Dev, Backend::Inline(processor))
    }

    fn new(mode: DeliveryMode, backend: Backend) -> Self {
        Self {
            mode,
            backend,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// The job queue, in queued mode.
    pub fn queue(&self) -> Option<&JobQueue> {
        match &self.backend {
            Backend::Queue(queue) => Some(queue),
            Backend::Inline(_) => None,
        }
    }

    /// Hand `payload` to the backend.
    ///
    /// Queued mode returns once the job is enqueued. Inline and dev modes
    /// return once processing finished, and propagate its failure.
    pub async fn deliver(
        &self,
        ctx: &DeliveryContext<'_>,
        payload: NotificationPayload,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        payload.validate()?;

        for observer in &self.observers {
            observer.observe(ctx, &payload);
        }

        match &self.backend {
            Backend::Queue(queue) => {
                let ticket = queue.add(payload).await?;
                tracing::debug!(
                    handler = ctx.handler_id,
                    job_id = %ticket.job_id(),
                    queue = queue.name(),
                    "Payload enqueued"
                );
                Ok(DeliveryReceipt::Queued(ticket))
            }
            Backend::Inline(processor) => {
                let outcome = processor.process(&payload).await?;
                Ok(DeliveryReceipt::Processed(outcome))
            }
        }
    }

    /// Stop the backend. In queued mode, buffered jobs are drained first.
    pub async fn shutdown(&self) {
        if let Backend::Queue(queue) = &self.backend {
            queue.shutdown().await;
        }
    }
}
