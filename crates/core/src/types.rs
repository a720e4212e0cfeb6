//! Event-type identifiers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of an event-type tag.
pub const MAX_TAG_LEN: usize = 128;

/// Lower-case words separated by `.`, `-` or `_`, e.g. `order.placed` or
/// `order-confirmation`.
pub const TAG_PATTERN: &str = r"^[a-z][a-z0-9]*(?:[._-][a-z0-9]+)*$";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(TAG_PATTERN).expect("valid regex"));

/// Validated identifier of an event class.
///
/// Handlers and events are matched by comparing tags, so a tag is
/// normalised at construction and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventTag(String);

impl EventTag {
    /// Parse and validate a tag.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let tag = raw.trim();
        if tag.is_empty() {
            return Err(CoreError::Validation(
                "Event type must not be empty".to_string(),
            ));
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(CoreError::Validation(format!(
                "Event type exceeds maximum length of {MAX_TAG_LEN} characters (got {})",
                tag.len()
            )));
        }
        if !TAG_RE.is_match(tag) {
            return Err(CoreError::Validation(format!(
                "Event type '{tag}' is malformed: expected lower-case words separated by '.', '-' or '_'"
            )));
        }
        Ok(Self(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for EventTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EventTag {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventTag> for String {
    fn from(tag: EventTag) -> Self {
        tag.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_and_hyphenated_tags() {
        for raw in ["order.placed", "order-confirmation", "account_verified", "refund2"] {
            assert!(EventTag::parse(raw).is_ok(), "{raw} should be accepted");
        }
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let tag = EventTag::parse("  order.placed ").unwrap();
        assert_eq!(tag.as_str(), "order.placed");
    }

    #[test]
    fn rejects_malformed_tags() {
        for raw in ["", "Order.Placed", "order..placed", ".order", "order placed", "9lives"] {
            assert!(EventTag::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_tag() {
        let raw = "a".repeat(MAX_TAG_LEN + 1);
        let err = EventTag::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<EventTag, _> = serde_json::from_str("\"order.placed\"");
        assert!(ok.is_ok());
        let bad: Result<EventTag, _> = serde_json::from_str("\"NOT VALID\"");
        assert!(bad.is_err());
    }
}
