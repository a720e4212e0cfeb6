//! Postbox event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`DomainEvent`]: the event envelope the host application publishes.
//! - [`EventSubscription`]: a receiver filtered to a single event type.

pub mod bus;

pub use bus::{DomainEvent, EventBus, EventSubscription};
