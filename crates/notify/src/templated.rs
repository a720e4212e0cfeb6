//! Declarative handlers.
//!
//! Most notifications are "when X happens, send template T to the address in
//! field F". [`TemplatedHandler`] covers that without writing a handler type:
//!
//! ```rust
//! use postbox_notify::templated::TemplatedHandler;
//!
//! let handler = TemplatedHandler::new("order-confirmation")
//!     .recipient_pointer("/customer/email")
//!     .subject("Your order {{ order.number }}")
//!     .filter(|event| event.payload["total"].as_f64().unwrap_or(0.0) > 0.0);
//! ```

use async_trait::async_trait;
use postbox_core::{GlobalVars, NotificationPayload};
use postbox_events::DomainEvent;
use serde_json::Value;

use crate::error::HandlerError;
use crate::handler::{EventHandler, HandlerResult};

type Predicate = Box<dyn Fn(&DomainEvent) -> bool + Send + Sync>;
type Extract<T> = Box<dyn Fn(&DomainEvent) -> T + Send + Sync>;

/// Builds a [`NotificationPayload`] from an event without custom code.
///
/// Template variables default to the event payload; globals fill in any key
/// the handler does not set.
pub struct TemplatedHandler {
    template: String,
    recipient: Extract<Option<String>>,
    from: Option<String>,
    subject: Option<String>,
    filter: Option<Predicate>,
    vars: Option<Extract<Value>>,
}

impl TemplatedHandler {
    /// Handler for `template`, addressed to the event payload's `email`
    /// field until told otherwise.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            recipient: Box::new(|event| string_at(&event.payload, "/email")),
            from: None,
            subject: None,
            filter: None,
            vars: None,
        }
    }

    /// Take the recipient from a JSON pointer into the event payload.
    pub fn recipient_pointer(mut self, pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        self.recipient = Box::new(move |event| string_at(&event.payload, &pointer));
        self
    }

    pub fn recipient<F>(mut self, f: F) -> Self
    where
        F: Fn(&DomainEvent) -> Option<String> + Send + Sync + 'static,
    {
        self.recipient = Box::new(f);
        self
    }

    pub fn sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Only send when `f` returns true.
    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&DomainEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(f));
        self
    }

    /// Compute template variables instead of using the event payload.
    pub fn vars<F>(mut self, f: F) -> Self
    where
        F: Fn(&DomainEvent) -> Value + Send + Sync + 'static,
    {
        self.vars = Some(Box::new(f));
        self
    }
}

fn string_at(payload: &Value, pointer: &str) -> Option<String> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl EventHandler for TemplatedHandler {
    async fn handle(&self, event: &DomainEvent, globals: &GlobalVars) -> HandlerResult {
        if let Some(filter) = &self.filter {
            if !filter(event) {
                return Ok(None);
            }
        }

        let recipient = (self.recipient)(event).ok_or_else(|| {
            HandlerError::msg(format!(
                "no recipient in '{}' event for template '{}'",
                event.event_type, self.template
            ))
        })?;

        let vars = match &self.vars {
            Some(f) => f(event),
            None => event.payload.clone(),
        };

        let mut payload = NotificationPayload::new(recipient, self.template.clone())
            .with_vars(vars)
            .with_event_type(event.event_type.clone())
            .merge_globals(globals);
        payload.from = self.from.clone();
        payload.subject = self.subject.clone();
        payload.locale = event.locale.clone();

        Ok(Some(payload))
    }
}
