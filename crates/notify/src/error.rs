//! Error types shared across the dispatch pipeline.
//!
//! Module-local failures (rendering, transports, jobs, the mailbox server)
//! live next to the code that raises them; this module holds the errors that
//! cross component boundaries.

use postbox_core::CoreError;

use crate::mailbox::MailboxError;
use crate::processor::ProcessError;

// ---------------------------------------------------------------------------
// HandlerError
// ---------------------------------------------------------------------------

/// Failure raised by a handler body or its data loader.
///
/// Recovered at the dispatch boundary: it is logged and ends the chain for
/// that one handler invocation.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A loader asked the injector for a service that is not registered.
    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    /// Any other failure inside handler or loader code.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl HandlerError {
    /// Wrap an arbitrary message as a handler failure.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Failed(anyhow::anyhow!("{message}"))
    }
}

// ---------------------------------------------------------------------------
// DeliveryError
// ---------------------------------------------------------------------------

/// Failure handing a payload to its delivery backend.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The handler returned a payload that cannot be addressed or rendered.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] CoreError),

    /// The job queue is shut down or its buffer is gone.
    #[error("Queue '{queue}' is unavailable")]
    QueueUnavailable { queue: String },

    /// Inline processing (render + transport) failed.
    #[error("Payload processing failed: {0}")]
    Processing(#[from] ProcessError),
}

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Everything that can end a single handler's dispatch chain.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Handler execution failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// The handler, loader or delivery code panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// BootstrapError
// ---------------------------------------------------------------------------

/// Invalid plugin configuration. Fatal: startup is aborted.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate handler id '{0}'")]
    DuplicateHandler(String),

    #[error("Handler '{handler}' listens for unknown event type '{event_type}'")]
    UnknownEventType { handler: String, event_type: String },

    #[error("No transport configured for {mode} delivery")]
    MissingTransport { mode: &'static str },

    #[error("Dev mailbox failed to start: {0}")]
    Mailbox(#[from] MailboxError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_not_found_names_the_service() {
        let err = HandlerError::DependencyNotFound("OrderRepo".to_string());
        assert_eq!(err.to_string(), "Dependency not found: OrderRepo");
    }

    #[test]
    fn failed_is_transparent() {
        let err = HandlerError::msg("customer has no email");
        assert_eq!(err.to_string(), "customer has no email");
    }

    #[test]
    fn dispatch_error_wraps_handler_error() {
        let err = DispatchError::from(HandlerError::msg("boom"));
        assert_eq!(err.to_string(), "Handler execution failed: boom");
    }

    #[test]
    fn queue_unavailable_display() {
        let err = DeliveryError::QueueUnavailable {
            queue: "send-notification".to_string(),
        };
        assert_eq!(err.to_string(), "Queue 'send-notification' is unavailable");
    }
}
