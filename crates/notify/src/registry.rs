//! Ordered mapping from event type to handlers.
//!
//! Built once at bootstrap and read-only afterwards, so it is shared as
//! `Arc<HandlerRegistry>` without locking. Several handlers may listen for
//! the same event type; lookups return all of them in registration order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use postbox_core::EventTag;

use crate::error::BootstrapError;
use crate::handler::HandlerDefinition;

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<HandlerDefinition>>,
    by_tag: HashMap<EventTag, Vec<Arc<HandlerDefinition>>>,
    /// Distinct tags in first-registration order.
    tags: Vec<EventTag>,
}

impl HandlerRegistry {
    /// Register `handlers` in order.
    ///
    /// Fails when two handlers share an id.
    pub fn register(
        handlers: impl IntoIterator<Item = HandlerDefinition>,
    ) -> Result<Self, BootstrapError> {
        Self::builder().handlers(handlers).build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// All handlers listening for `tag`, in registration order.
    pub fn by_event_type(&self, tag: &str) -> &[Arc<HandlerDefinition>] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct event types that have at least one handler.
    pub fn event_types(&self) -> impl Iterator<Item = &EventTag> {
        self.tags.iter()
    }

    /// Look a handler up by id.
    pub fn get(&self, id: &str) -> Option<&Arc<HandlerDefinition>> {
        self.handlers.iter().find(|h| h.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<HandlerDefinition>> {
        self.handlers.iter()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Collects handlers and validates them together.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: Vec<HandlerDefinition>,
    known_event_types: Option<HashSet<String>>,
}

impl RegistryBuilder {
    pub fn handler(mut self, handler: HandlerDefinition) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(mut self, handlers: impl IntoIterator<Item = HandlerDefinition>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Restrict handlers to event types the host actually publishes.
    ///
    /// A handler for any other type fails the build.
    pub fn known_event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_event_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<HandlerRegistry, BootstrapError> {
        let mut registry = HandlerRegistry::default();
        let mut ids = HashSet::new();

        for handler in self.handlers {
            if !ids.insert(handler.id().to_string()) {
                return Err(BootstrapError::DuplicateHandler(handler.id().to_string()));
            }
            if let Some(known) = &self.known_event_types {
                if !known.contains(handler.event_type().as_str()) {
                    return Err(BootstrapError::UnknownEventType {
                        handler: handler.id().to_string(),
                        event_type: handler.event_type().to_string(),
                    });
                }
            }

            let handler = Arc::new(handler);
            let tag = handler.event_type().clone();
            let slot = registry.by_tag.entry(tag.clone()).or_default();
            if slot.is_empty() {
                registry.tags.push(tag);
            }
            slot.push(Arc::clone(&handler));
            registry.handlers.push(handler);
        }

        tracing::debug!(
            handlers = registry.handlers.len(),
            event_types = registry.tags.len(),
            "Handler registry built"
        );
        Ok(registry)
    }
}
