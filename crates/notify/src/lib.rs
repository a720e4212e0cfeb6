//! Event-to-notification dispatch pipeline.
//!
//! Domain events published on a [`postbox_events::EventBus`] are matched
//! against a [`HandlerRegistry`]; each matching handler (optionally after an
//! async data loader) produces a [`NotificationPayload`](postbox_core::NotificationPayload)
//! that the [`DeliveryRouter`] either enqueues for a worker or processes
//! inline. In dev mode a local mailbox captures every payload.
//!
//! [`NotifyPlugin`] wires it all together from a [`NotifyConfig`].

pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod loader;
pub mod mailbox;
pub mod plugin;
pub mod processor;
pub mod registry;
pub mod render;
pub mod templated;
pub mod transport;

pub use config::{DevConfig, NotifyConfig};
pub use delivery::{DeliveryMode, DeliveryReceipt, DeliveryRouter};
pub use dispatcher::{DispatchReport, EventDispatcher, HandlerOutcome, HandlerReport};
pub use error::{BootstrapError, DeliveryError, DispatchError, HandlerError};
pub use handler::{
    handler_fn, EnrichedEventHandler, EventEnvelope, EventHandler, HandlerDefinition, HandlerKind,
    HandlerResult,
};
pub use loader::{DataContext, Injector, ServiceRegistry};
pub use mailbox::{DevMailbox, MailboxOptions, MailboxStore};
pub use plugin::{NotifyPlugin, NotifyPluginBuilder};
pub use registry::HandlerRegistry;
pub use render::{Template, TemplateSet};
pub use templated::TemplatedHandler;
