//! Worker side of queued delivery.
//!
//! The queue never renders or sends anything itself. Its process callback,
//! [`QueueForwarder`], turns each job into a [`WorkerMessage`] and hands it
//! to a [`WorkerMessaging`] channel; whatever sits behind that channel
//! processes the payload and replies with the outcome. The job reaches its
//! terminal state from that reply.
//!
//! [`ChannelWorker`] is the in-process worker: a tokio task that receives
//! messages over mpsc and answers over oneshot.

use std::sync::Arc;

use async_trait::async_trait;
use postbox_core::NotificationPayload;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::queue::{Job, JobError, JobProcessor};
use crate::processor::{PayloadProcessor, ProcessOutcome};

/// Messages buffered in the worker channel before senders wait.
const WORKER_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    ProcessPayload {
        job_id: Uuid,
        payload: NotificationPayload,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The worker is gone or dropped the reply.
    #[error("Worker is unavailable")]
    Unavailable,

    /// The worker processed the message and failed.
    #[error("{0}")]
    Failed(String),
}

/// Request/response channel to a worker.
#[async_trait]
pub trait WorkerMessaging: Send + Sync {
    async fn send(&self, message: WorkerMessage) -> Result<ProcessOutcome, WorkerError>;
}

// ---------------------------------------------------------------------------
// QueueForwarder
// ---------------------------------------------------------------------------

/// Job processor that forwards every job to a worker.
pub struct QueueForwarder {
    messaging: Arc<dyn WorkerMessaging>,
}

impl QueueForwarder {
    pub fn new(messaging: Arc<dyn WorkerMessaging>) -> Self {
        Self { messaging }
    }
}

#[async_trait]
impl JobProcessor for QueueForwarder {
    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let message = WorkerMessage::ProcessPayload {
            job_id: job.id,
            payload: job.payload.clone(),
        };
        match self.messaging.send(message).await {
            Ok(_) => Ok(()),
            Err(WorkerError::Unavailable) => Err(JobError::Aborted),
            Err(WorkerError::Failed(reason)) => Err(JobError::Rejected(reason)),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelWorker
// ---------------------------------------------------------------------------

type Request = (WorkerMessage, oneshot::Sender<Result<ProcessOutcome, WorkerError>>);

/// Sending half of the in-process worker.
#[derive(Clone)]
pub struct ChannelWorker {
    sender: mpsc::Sender<Request>,
}

/// Join handle for the in-process worker task.
///
/// The task ends once every [`ChannelWorker`] clone has been dropped and all
/// in-flight messages are answered.
pub struct WorkerHandle {
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Notification worker task failed");
        }
    }
}

impl ChannelWorker {
    /// Spawn a worker that runs every message through `processor`.
    pub fn spawn(processor: Arc<dyn PayloadProcessor>) -> (Self, WorkerHandle) {
        let (sender, receiver) = mpsc::channel(WORKER_BUFFER);
        let task = tokio::spawn(worker_loop(receiver, processor));
        (Self { sender }, WorkerHandle { task })
    }
}

#[async_trait]
impl WorkerMessaging for ChannelWorker {
    async fn send(&self, message: WorkerMessage) -> Result<ProcessOutcome, WorkerError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send((message, reply))
            .await
            .map_err(|_| WorkerError::Unavailable)?;
        response.await.unwrap_or(Err(WorkerError::Unavailable))
    }
}

async fn worker_loop(mut receiver: mpsc::Receiver<Request>, processor: Arc<dyn PayloadProcessor>) {
    let tasks = TaskTracker::new();
    tracing::info!("Notification worker started");

    while let Some((message, reply)) = receiver.recv().await {
        let processor = Arc::clone(&processor);
        tasks.spawn(async move {
            let WorkerMessage::ProcessPayload { job_id, payload } = message;
            let result = match processor.process(&payload).await {
                Ok(outcome) => {
                    tracing::debug!(
                        %job_id,
                        recipient = %outcome.recipient,
                        transport = %outcome.transport,
                        "Payload processed"
                    );
                    Ok(outcome)
                }
                Err(e) => Err(WorkerError::Failed(e.to_string())),
            };
            let _ = reply.send(result);
        });
    }

    tasks.close();
    tasks.wait().await;
    tracing::info!("Notification worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
