//! Service assembly shared by the binary and the integration tests.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use postbox_events::EventBus;
use postbox_notify::transport::Transport;
use postbox_notify::{NotifyConfig, NotifyPlugin};

use crate::config::ServerConfig;
use crate::demo::{self, CustomerDirectory};
use crate::router::build_app_router;
use crate::state::{AppState, MailboxTarget};

/// A wired-up host: router plus the parts that outlive a request.
pub struct App {
    pub router: Router,
    pub plugin: NotifyPlugin,
    pub event_bus: Arc<EventBus>,
    pub customers: Arc<CustomerDirectory>,
}

/// Seed the customer directory, start the notification pipeline on a fresh
/// bus, and build the router over both.
pub async fn build_app(
    config: &ServerConfig,
    notify_config: NotifyConfig,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<App> {
    let customers = match &config.customers_file {
        Some(path) => {
            let directory = CustomerDirectory::from_json_file(path)?;
            tracing::info!(path = %path.display(), count = directory.len(), "Seeded customer directory");
            directory
        }
        None => CustomerDirectory::new(),
    };
    let customers = Arc::new(customers);

    let event_bus = Arc::new(EventBus::default());

    let plugin = NotifyPlugin::builder(notify_config)
        .handlers(demo::handlers()?)
        .templates(demo::templates())
        .injector(Arc::new(demo::services(Arc::clone(&customers))))
        .transport(transport)
        .start(&event_bus)
        .await
        .context("Failed to start notification pipeline")?;

    let state = AppState {
        config: Arc::new(config.clone()),
        event_bus: Arc::clone(&event_bus),
        delivery_mode: plugin.mode(),
        mailbox: plugin.mailbox().map(|mailbox| MailboxTarget {
            addr: mailbox.local_addr(),
            route: mailbox.route().to_string(),
        }),
        http: reqwest::Client::new(),
        customers: Arc::clone(&customers),
    };

    let router = build_app_router(state, config)?;

    Ok(App {
        router,
        plugin,
        event_bus,
        customers,
    })
}
