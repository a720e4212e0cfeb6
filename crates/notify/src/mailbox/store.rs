//! Captured payloads for the dev mailbox.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use postbox_core::NotificationPayload;
use serde::Serialize;
use uuid::Uuid;

use crate::delivery::{DeliveryContext, DeliveryObserver};

/// One captured delivery.
#[derive(Debug, Clone, Serialize)]
pub struct MailboxEntry {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub handler_id: String,
    pub event_type: String,
    pub correlation_id: Uuid,
    pub payload: NotificationPayload,
}

/// List view of a [`MailboxEntry`].
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub handler_id: String,
    pub event_type: String,
    pub recipient: String,
    pub template: String,
    pub subject: Option<String>,
}

impl From<&MailboxEntry> for EntrySummary {
    fn from(entry: &MailboxEntry) -> Self {
        Self {
            id: entry.id,
            captured_at: entry.captured_at,
            handler_id: entry.handler_id.clone(),
            event_type: entry.event_type.clone(),
            recipient: entry.payload.recipient.clone(),
            template: entry.payload.template.clone(),
            subject: entry.payload.subject.clone(),
        }
    }
}

/// Append-only list of captured payloads, oldest first.
#[derive(Debug, Default)]
pub struct MailboxStore {
    entries: Mutex<Vec<MailboxEntry>>,
}

impl MailboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MailboxEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: MailboxEntry) {
        self.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<MailboxEntry> {
        self.lock().clone()
    }

    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.lock().iter().map(EntrySummary::from).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<MailboxEntry> {
        self.lock().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }
}

impl DeliveryObserver for MailboxStore {
    fn observe(&self, ctx: &DeliveryContext<'_>, payload: &NotificationPayload) {
        self.push(MailboxEntry {
            id: Uuid::now_v7(),
            captured_at: Utc::now(),
            handler_id: ctx.handler_id.to_string(),
            event_type: ctx.event_type.to_string(),
            correlation_id: ctx.correlation_id,
            payload: payload.clone(),
        });
    }
}
