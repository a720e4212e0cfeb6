//! In-memory job queue with bounded concurrency.
//!
//! [`JobQueue`] is the reference queue engine used in queued delivery mode.
//! Jobs are buffered on an mpsc channel and handed to a [`JobProcessor`]
//! (the queue's process callback), at most `concurrency` at a time. Each
//! [`JobQueue::add`] returns a [`JobTicket`] that resolves when the job
//! completes or fails. Jobs are never retried.
//!
//! Finished jobs stay queryable through [`JobQueue::state`] until the
//! retention limit pushes them out, oldest first. [`QueueStats`] keeps
//! running totals regardless.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postbox_core::NotificationPayload;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::error::DeliveryError;

/// Queue name used when none is configured.
pub const DEFAULT_QUEUE_NAME: &str = "send-notification";

/// Concurrent in-flight jobs when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Finished jobs whose state is kept when none is configured.
pub const DEFAULT_RETAINED_JOBS: usize = 1024;

/// Jobs buffered before `add` starts waiting for room.
const QUEUE_BUFFER: usize = 1024;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A unit of queued work.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    pub payload: NotificationPayload,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed { reason: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The worker reported a failure.
    #[error("Worker rejected job: {0}")]
    Rejected(String),

    /// The job was dropped before reaching a terminal state.
    #[error("Job aborted before completion")]
    Aborted,
}

/// The queue's process callback.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<(), JobError>;
}

/// Completion handle for one job.
#[derive(Debug)]
pub struct JobTicket {
    job_id: Uuid,
    completion: oneshot::Receiver<Result<(), JobError>>,
}

impl JobTicket {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Wait for the job to complete or fail.
    pub async fn wait(self) -> Result<(), JobError> {
        self.completion.await.unwrap_or(Err(JobError::Aborted))
    }
}

/// Job counts by state. `completed` and `failed` are totals since start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

struct Envelope {
    job: Job,
    done: oneshot::Sender<Result<(), JobError>>,
}

/// Live job states plus the finished ones still retained.
#[derive(Debug)]
struct JobTable {
    states: HashMap<Uuid, JobState>,
    /// Finished job ids, oldest first.
    finished: VecDeque<Uuid>,
    retain: usize,
    completed: usize,
    failed: usize,
}

impl JobTable {
    fn new(retain: usize) -> Self {
        Self {
            states: HashMap::new(),
            finished: VecDeque::new(),
            retain,
            completed: 0,
            failed: 0,
        }
    }

    fn set(&mut self, job_id: Uuid, state: JobState) {
        match state {
            JobState::Completed => self.completed += 1,
            JobState::Failed { .. } => self.failed += 1,
            JobState::Pending | JobState::Running => {
                self.states.insert(job_id, state);
                return;
            }
        }
        self.states.insert(job_id, state);
        self.finished.push_back(job_id);
        self.evict();
    }

    fn set_retention(&mut self, retain: usize) {
        self.retain = retain;
        self.evict();
    }

    fn evict(&mut self) {
        while self.finished.len() > self.retain {
            if let Some(oldest) = self.finished.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            completed: self.completed,
            failed: self.failed,
            ..QueueStats::default()
        };
        for state in self.states.values() {
            match state {
                JobState::Pending => stats.pending += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed | JobState::Failed { .. } => {}
            }
        }
        stats
    }
}

type StateTable = Arc<Mutex<JobTable>>;

fn lock(states: &StateTable) -> MutexGuard<'_, JobTable> {
    states.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

/// Named queue feeding a [`JobProcessor`].
pub struct JobQueue {
    name: String,
    concurrency: usize,
    sender: mpsc::Sender<Envelope>,
    states: StateTable,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl JobQueue {
    /// Create the queue and start its runner task.
    ///
    /// A `concurrency` of zero is treated as one.
    pub fn start(
        name: impl Into<String>,
        concurrency: usize,
        processor: Arc<dyn JobProcessor>,
    ) -> Self {
        let name = name.into();
        let concurrency = concurrency.max(1);
        let (sender, receiver) = mpsc::channel(QUEUE_BUFFER);
        let states = Arc::new(Mutex::new(JobTable::new(DEFAULT_RETAINED_JOBS)));
        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();

        let runner = Runner {
            queue: name.clone(),
            processor,
            states: Arc::clone(&states),
            permits: Arc::new(Semaphore::new(concurrency)),
            tasks: tasks.clone(),
        };
        tasks.spawn(runner.run(receiver, cancel.clone()));

        tracing::info!(queue = %name, concurrency, "Job queue started");

        Self {
            name,
            concurrency,
            sender,
            states,
            cancel,
            tasks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Keep the states of at most `retain` finished jobs.
    pub fn with_retention(self, retain: usize) -> Self {
        lock(&self.states).set_retention(retain);
        self
    }

    /// Jobs whose state is currently queryable.
    pub fn tracked_jobs(&self) -> usize {
        lock(&self.states).states.len()
    }

    /// Enqueue a payload.
    ///
    /// Fails with [`DeliveryError::QueueUnavailable`] once the queue has
    /// been shut down.
    pub async fn add(&self, payload: NotificationPayload) -> Result<JobTicket, DeliveryError> {
        let job = Job {
            id: Uuid::now_v7(),
            queue: self.name.clone(),
            payload,
            enqueued_at: Utc::now(),
        };
        let job_id = job.id;
        let (done, completion) = oneshot::channel();

        lock(&self.states).set(job_id, JobState::Pending);

        if self.sender.send(Envelope { job, done }).await.is_err() {
            lock(&self.states).states.remove(&job_id);
            return Err(DeliveryError::QueueUnavailable {
                queue: self.name.clone(),
            });
        }

        Ok(JobTicket { job_id, completion })
    }

    /// Current state of a job, if the queue has seen it.
    pub fn state(&self, job_id: Uuid) -> Option<JobState> {
        lock(&self.states).states.get(&job_id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        lock(&self.states).stats()
    }

    /// Stop accepting jobs, drain buffered ones, and wait for all running
    /// jobs to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!(queue = %self.name, "Job queue shut down");
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

struct Runner {
    queue: String,
    processor: Arc<dyn JobProcessor>,
    states: StateTable,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl Runner {
    async fn run(self, mut receiver: mpsc::Receiver<Envelope>, cancel: CancellationToken) {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.spawn_job(envelope).await;
        }

        // No new jobs from here on; finish what is already buffered.
        receiver.close();
        while let Some(envelope) = receiver.recv().await {
            self.spawn_job(envelope).await;
        }

        tracing::debug!(queue = %self.queue, "Job queue runner stopped");
    }

    /// Wait for a free slot, then run the job on its own task.
    async fn spawn_job(&self, envelope: Envelope) {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            let _ = envelope.done.send(Err(JobError::Aborted));
            return;
        };

        let processor = Arc::clone(&self.processor);
        let states = Arc::clone(&self.states);
        let queue = self.queue.clone();

        self.tasks.spawn(async move {
            let _permit = permit;
            let Envelope { job, done } = envelope;

            lock(&states).set(job.id, JobState::Running);
            let result = processor.process(&job).await;

            match &result {
                Ok(()) => {
                    lock(&states).set(job.id, JobState::Completed);
                    tracing::info!(
                        queue = %queue,
                        job_id = %job.id,
                        recipient = %job.payload.recipient,
                        "Job completed"
                    );
                }
                Err(e) => {
                    lock(&states).set(
                        job.id,
                        JobState::Failed {
                            reason: e.to_string(),
                        },
                    );
                    tracing::error!(queue = %queue, job_id = %job.id, error = %e, "Job failed");
                }
            }

            // The submitter may have dropped its ticket.
            let _ = done.send(result);
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
