//! Async data enrichment for handlers that declare a loader.
//!
//! A loader receives a [`DataContext`]: the triggering event plus an
//! [`Injector`] through which it resolves host-managed services (including
//! any persistence handle) by type. [`load`] awaits the loader to completion
//! before the handler body runs; a failing loader means the body is never
//! called.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use postbox_events::DomainEvent;

use crate::error::HandlerError;
use crate::handler::EnrichedEventHandler;

/// A type-erased service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

// ---------------------------------------------------------------------------
// Injector
// ---------------------------------------------------------------------------

/// Capability to resolve host services by type.
///
/// Implemented by whatever the host uses for wiring: a container, a static
/// registry, or hand-built values. The pipeline only needs this lookup.
pub trait Injector: Send + Sync {
    /// Return the service registered under `token`, if any.
    fn resolve_any(&self, token: TypeId) -> Option<Service>;
}

/// Map-backed [`Injector`].
///
/// ```rust
/// use postbox_notify::loader::ServiceRegistry;
///
/// struct Mailer;
/// let services = ServiceRegistry::new().with(Mailer);
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Service>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared service, replacing any previous one of that type.
    pub fn provide<T: Any + Send + Sync>(&mut self, service: Arc<T>) -> &mut Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Builder form of [`provide`](Self::provide).
    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.provide(Arc::new(service));
        self
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Injector for ServiceRegistry {
    fn resolve_any(&self, token: TypeId) -> Option<Service> {
        self.services.get(&token).cloned()
    }
}

// ---------------------------------------------------------------------------
// DataContext
// ---------------------------------------------------------------------------

/// Everything a loader may use to produce its data.
pub struct DataContext<'a> {
    event: &'a DomainEvent,
    injector: &'a dyn Injector,
}

impl<'a> DataContext<'a> {
    pub fn new(event: &'a DomainEvent, injector: &'a dyn Injector) -> Self {
        Self { event, injector }
    }

    /// The event being enriched.
    pub fn event(&self) -> &'a DomainEvent {
        self.event
    }

    /// Resolve a required service.
    ///
    /// Fails with [`HandlerError::DependencyNotFound`] when nothing of type
    /// `T` is registered.
    pub fn inject<T: Any + Send + Sync>(&self) -> Result<Arc<T>, HandlerError> {
        self.try_inject::<T>()
            .ok_or_else(|| HandlerError::DependencyNotFound(type_name::<T>().to_string()))
    }

    /// Resolve an optional service.
    pub fn try_inject<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.injector
            .resolve_any(TypeId::of::<T>())
            .and_then(|service| service.downcast::<T>().ok())
    }
}

/// Run `handler`'s loader for `event`.
pub async fn load<H>(
    handler: &H,
    event: &DomainEvent,
    injector: &dyn Injector,
) -> Result<H::Data, HandlerError>
where
    H: EnrichedEventHandler + ?Sized,
{
    let ctx = DataContext::new(event, injector);
    let data = handler.load_data(&ctx).await?;
    tracing::debug!(event_type = %event.event_type, "Handler data loaded");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    struct OrderRepo {
        prefix: &'static str,
    }

    #[derive(Debug)]
    struct Unregistered;

    #[test]
    fn inject_resolves_registered_service() {
        let services = ServiceRegistry::new().with(OrderRepo { prefix: "ord" });
        let event = DomainEvent::new("order.placed");
        let ctx = DataContext::new(&event, &services);

        let repo = ctx.inject::<OrderRepo>().unwrap();
        assert_eq!(repo.prefix, "ord");
        assert_eq!(ctx.event().event_type, "order.placed");
    }

    #[test]
    fn inject_missing_service_is_dependency_not_found() {
        let services = ServiceRegistry::new();
        let event = DomainEvent::new("order.placed");
        let ctx = DataContext::new(&event, &services);

        let err = ctx.inject::<Unregistered>().unwrap_err();
        assert_matches!(err, HandlerError::DependencyNotFound(name) if name.contains("Unregistered"));
        assert!(ctx.try_inject::<Unregistered>().is_none());
    }

    #[test]
    fn provide_replaces_previous_instance() {
        let mut services = ServiceRegistry::new();
        services.provide(Arc::new(OrderRepo { prefix: "old" }));
        services.provide(Arc::new(OrderRepo { prefix: "new" }));
        assert_eq!(services.len(), 1);

        let event = DomainEvent::new("order.placed");
        let ctx = DataContext::new(&event, &services);
        assert_eq!(ctx.inject::<OrderRepo>().unwrap().prefix, "new");
    }
}
