use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use postbox_events::EventBus;
use postbox_notify::{DeliveryMode, NotifyPlugin};
use tower::ServiceExt;

use postbox_api::config::ServerConfig;
use postbox_api::demo::CustomerDirectory;
use postbox_api::router::build_app_router;
use postbox_api::state::{AppState, MailboxTarget};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and the default 64 KiB body limit.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_body_bytes: 65536,
        customers_file: None,
    }
}

/// Build the full application router around `bus`.
///
/// When `plugin` runs a dev mailbox it is mounted exactly as `main.rs`
/// mounts it.
pub fn build_test_app(bus: Arc<EventBus>, plugin: Option<&NotifyPlugin>) -> Router {
    let state = AppState {
        config: Arc::new(test_config()),
        event_bus: bus,
        delivery_mode: plugin.map_or(DeliveryMode::Inline, NotifyPlugin::mode),
        mailbox: plugin.and_then(NotifyPlugin::mailbox).map(|mailbox| MailboxTarget {
            addr: mailbox.local_addr(),
            route: mailbox.route().to_string(),
        }),
        http: reqwest::Client::new(),
        customers: Arc::new(CustomerDirectory::new()),
    };
    build_app_router(state, &test_config()).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
