use std::net::SocketAddr;
use std::sync::Arc;

use postbox_events::EventBus;
use postbox_notify::DeliveryMode;

use crate::config::ServerConfig;
use crate::demo::CustomerDirectory;

/// Where the dev mailbox listens and the host route it is mounted under.
#[derive(Debug, Clone)]
pub struct MailboxTarget {
    pub addr: SocketAddr,
    pub route: String,
}

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Event bus the notification pipeline listens on.
    pub event_bus: Arc<EventBus>,
    pub delivery_mode: DeliveryMode,
    /// Set when the dev mailbox is running.
    pub mailbox: Option<MailboxTarget>,
    /// Client used to proxy mailbox requests.
    pub http: reqwest::Client,
    /// Customers the order-confirmation loader reads from.
    pub customers: Arc<CustomerDirectory>,
}
