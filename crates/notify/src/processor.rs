//! Payload processing: render, then send.
//!
//! [`PayloadProcessor`] is the interface both delivery paths end in: the
//! worker calls it for queued jobs and the router calls it directly in inline
//! and dev mode.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postbox_core::NotificationPayload;
use serde::{Deserialize, Serialize};

use crate::render::{RenderError, TemplateSet};
use crate::transport::{Transport, TransportError};

/// What a processed payload turned into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub recipient: String,
    pub subject: String,
    /// Name of the transport that sent the message.
    pub transport: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),
}

#[async_trait]
pub trait PayloadProcessor: Send + Sync {
    async fn process(&self, payload: &NotificationPayload) -> Result<ProcessOutcome, ProcessError>;
}

/// Renders with a [`TemplateSet`] and sends through a [`Transport`].
pub struct TemplateProcessor {
    templates: Arc<TemplateSet>,
    transport: Arc<dyn Transport>,
}

impl TemplateProcessor {
    pub fn new(templates: Arc<TemplateSet>, transport: Arc<dyn Transport>) -> Self {
        Self {
            templates,
            transport,
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }
}

#[async_trait]
impl PayloadProcessor for TemplateProcessor {
    async fn process(&self, payload: &NotificationPayload) -> Result<ProcessOutcome, ProcessError> {
        let message = self.templates.render(payload)?;
        self.transport.send(&message).await?;

        Ok(ProcessOutcome {
            recipient: message.to,
            subject: message.subject,
            transport: self.transport.name().to_string(),
            processed_at: Utc::now(),
        })
    }
}
