//! Dev Mailbox Bridge.
//!
//! In dev mode every payload the router sees is captured in a
//! [`MailboxStore`], and a small HTTP server on `127.0.0.1:{port}` lets a
//! developer browse the captures and fire synthetic events at individual
//! handlers. The host proxies its `/{route}/...` path to this server.
//!
//! The server lives exactly as long as the plugin: [`DevMailbox::destroy`]
//! shuts it down gracefully, and dropping the [`DevMailbox`] cancels it on
//! any other exit path.

mod server;
pub mod store;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use postbox_events::DomainEvent;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatcher::HandlerReport;
use crate::handler::HandlerDefinition;
use crate::registry::HandlerRegistry;

pub use server::{HandlerInfo, MockEventRequest, MockEventResponse};
pub use store::{EntrySummary, MailboxEntry, MailboxStore};

/// Default host route segment the mailbox is proxied under.
pub const DEFAULT_MAILBOX_ROUTE: &str = "mailbox";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to bind dev mailbox on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("No handler with id '{0}'")]
    HandlerNotFound(String),

    #[error("No mailbox entry with id {0}")]
    EntryNotFound(Uuid),

    #[error("Mock events are not available yet")]
    MockUnavailable,
}

impl IntoResponse for MailboxError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            MailboxError::Bind { .. } => {
                tracing::error!(error = %self, "Dev mailbox error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            MailboxError::HandlerNotFound(_) | MailboxError::EntryNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            MailboxError::MockUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxOptions {
    /// Local port; `0` picks a free one.
    pub port: u16,
    /// Host route segment the mailbox is proxied under.
    pub route: String,
}

impl MailboxOptions {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            route: DEFAULT_MAILBOX_ROUTE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// MockEventSink
// ---------------------------------------------------------------------------

/// Runs a synthetic event through a single handler.
#[async_trait]
pub trait MockEventSink: Send + Sync {
    async fn dispatch_to(&self, handler: &HandlerDefinition, event: &DomainEvent) -> HandlerReport;
}

type SinkSlot = Arc<RwLock<Option<Arc<dyn MockEventSink>>>>;

// ---------------------------------------------------------------------------
// DevMailbox
// ---------------------------------------------------------------------------

pub struct DevMailbox {
    local_addr: SocketAddr,
    route: String,
    store: Arc<MailboxStore>,
    sink: SinkSlot,
    cancel: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl DevMailbox {
    /// Bind `127.0.0.1:{port}` and start serving.
    pub async fn serve(
        options: MailboxOptions,
        store: Arc<MailboxStore>,
        registry: Arc<HandlerRegistry>,
    ) -> Result<Self, MailboxError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, options.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MailboxError::Bind {
                port: options.port,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| MailboxError::Bind {
            port: options.port,
            source,
        })?;

        let sink = SinkSlot::default();
        let app = server::router(server::MailboxState {
            store: Arc::clone(&store),
            registry,
            sink: Arc::clone(&sink),
        });

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Dev mailbox server failed");
            }
        });

        tracing::info!(addr = %local_addr, route = %options.route, "Dev mailbox listening");

        Ok(Self {
            local_addr,
            route: options.route,
            store,
            sink,
            cancel,
            server: Mutex::new(Some(task)),
        })
    }

    /// Register how synthetic events are executed.
    pub fn handle_mock_event(&self, sink: Arc<dyn MockEventSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn store(&self) -> &Arc<MailboxStore> {
        &self.store
    }

    /// Stop the server and wait for in-flight requests.
    pub async fn destroy(&self) {
        self.cancel.cancel();
        let task = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Dev mailbox task failed");
            }
            tracing::info!(addr = %self.local_addr, "Dev mailbox stopped");
        }
    }
}

impl Drop for DevMailbox {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
