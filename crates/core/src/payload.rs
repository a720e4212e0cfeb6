//! The notification payload a handler produces.
//!
//! A [`NotificationPayload`] is a not-yet-rendered description of a message:
//! who receives it, which template renders it, and the variables the
//! template sees. It is moved into the delivery router and from there into a
//! queue job or an inline processor, so it is `Serialize` + `Deserialize`
//! to cross the worker boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Template variables shared by every handler (shop name, base URLs, ...).
pub type GlobalVars = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Recipient address.
    pub recipient: String,

    /// Sender address. `None` lets the transport use its default.
    pub from: Option<String>,

    /// Subject override. `None` uses the template's own subject.
    pub subject: Option<String>,

    /// Name of the template that renders this payload.
    pub template: String,

    /// Variables visible to the template.
    pub template_vars: Map<String, Value>,

    /// Locale the message should be rendered in.
    pub locale: Option<String>,

    /// Event type that produced the payload.
    pub event_type: Option<String>,

    /// When the payload was created (UTC).
    pub created_at: DateTime<Utc>,
}

impl NotificationPayload {
    /// Create a payload with only the required recipient and template.
    pub fn new(recipient: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            from: None,
            subject: None,
            template: template.into(),
            template_vars: Map::new(),
            locale: None,
            event_type: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Set a single template variable, replacing any previous value.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template_vars.insert(key.into(), value.into());
        self
    }

    /// Replace the template variables.
    ///
    /// Non-object values are ignored; template variables are always a map.
    pub fn with_vars(mut self, vars: Value) -> Self {
        if let Value::Object(map) = vars {
            self.template_vars = map;
        }
        self
    }

    /// Fill in global variables the payload does not already define.
    ///
    /// Handler-provided variables take precedence over globals.
    pub fn merge_globals(mut self, globals: &GlobalVars) -> Self {
        for (key, value) in globals {
            self.template_vars
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Check that the payload can be rendered and addressed.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.recipient.trim().is_empty() {
            return Err(CoreError::Validation(
                "Notification recipient must not be empty".to_string(),
            ));
        }
        if self.template.trim().is_empty() {
            return Err(CoreError::Validation(
                "Notification template must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
