//! Outbound transports for rendered messages.
//!
//! A [`Transport`] takes a [`RenderedMessage`] and gets it to the recipient
//! (or somewhere a developer can read it). Three are provided:
//!
//! - [`SmtpTransport`]: real mail over SMTP via `lettre`.
//! - [`FileTransport`]: one JSON file per message, used by dev mode.
//! - [`NoopTransport`]: logs and drops the message.

pub mod file;
pub mod smtp;

use async_trait::async_trait;

use crate::render::RenderedMessage;

pub use file::FileTransport;
pub use smtp::{SmtpConfig, SmtpTransport};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs and process outcomes.
    fn name(&self) -> &'static str;

    async fn send(&self, message: &RenderedMessage) -> Result<(), TransportError>;
}

/// Accepts every message and sends nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), TransportError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            template = %message.template,
            "Message dropped by no-op transport"
        );
        Ok(())
    }
}
