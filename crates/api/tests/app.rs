//! Integration tests that boot the service through `build_app`, the same
//! path the binary takes.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, post_json, send};
use postbox_api::app::build_app;
use postbox_api::config::ServerConfig;
use postbox_core::GlobalVars;
use postbox_notify::mailbox::MailboxOptions;
use postbox_notify::render::RenderedMessage;
use postbox_notify::transport::{NoopTransport, Transport, TransportError};
use postbox_notify::{DeliveryMode, NotifyConfig};
use serde_json::json;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Hands every sent message to the test.
struct ChannelTransport(mpsc::UnboundedSender<RenderedMessage>);

#[async_trait]
impl Transport for ChannelTransport {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), TransportError> {
        let _ = self.0.send(message.clone());
        Ok(())
    }
}

fn inline_config() -> NotifyConfig {
    let mut globals = GlobalVars::new();
    globals.insert("shop".to_string(), json!("Corner Shop"));
    NotifyConfig::new(DeliveryMode::Inline).with_global_vars(globals)
}

fn order_event(customer_id: &str) -> serde_json::Value {
    json!({
        "event_type": "order-confirmation",
        "payload": { "customer_id": customer_id, "order": { "number": "B-2" } },
    })
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<RenderedMessage>) -> RenderedMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("message delivered in time")
        .expect("transport still open")
}

// ---------------------------------------------------------------------------
// Test: a customer stored over HTTP receives their order confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stored_customer_receives_order_confirmation() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = build_app(&common::test_config(), inline_config(), Arc::new(ChannelTransport(tx)))
        .await
        .unwrap();

    let response = send(
        app.router.clone(),
        Method::PUT,
        "/api/v1/customers/c-7",
        Some(json!({ "name": "Lin", "email": "lin@example.com" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["email"], "lin@example.com");

    let stored = body_json(send(app.router.clone(), Method::GET, "/api/v1/customers/c-7", None).await).await;
    assert_eq!(stored["data"]["name"], "Lin");

    let response = post_json(app.router.clone(), "/api/v1/events", order_event("c-7")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let message = next_message(&mut rx).await;
    assert_eq!(message.to, "lin@example.com");
    assert_eq!(message.subject, "Order B-2 confirmed");
    assert_eq!(message.body, "Hi Lin, thanks for your order at Corner Shop.");

    app.plugin.destroy().await;
}

// ---------------------------------------------------------------------------
// Test: the directory is seeded from CUSTOMERS_FILE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn customers_file_seeds_directory() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "c-1": {{ "name": "Ada", "email": "ada@example.com" }} }}"#).unwrap();
    let config = ServerConfig {
        customers_file: Some(file.path().to_path_buf()),
        ..common::test_config()
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = build_app(&config, inline_config(), Arc::new(ChannelTransport(tx)))
        .await
        .unwrap();
    assert_eq!(app.customers.len(), 1);

    post_json(app.router.clone(), "/api/v1/events", order_event("c-1")).await;
    assert_eq!(next_message(&mut rx).await.to, "ada@example.com");

    app.plugin.destroy().await;
}

#[tokio::test]
async fn unreadable_customers_file_fails_startup() {
    let config = ServerConfig {
        customers_file: Some("/nonexistent/customers.json".into()),
        ..common::test_config()
    };

    let result = build_app(&config, inline_config(), Arc::new(NoopTransport)).await;

    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Test: customer input is validated and lookups 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn customer_routes_validate_and_report_missing() {
    let app = build_app(&common::test_config(), inline_config(), Arc::new(NoopTransport))
        .await
        .unwrap();

    let response = send(
        app.router.clone(),
        Method::PUT,
        "/api/v1/customers/c-1",
        Some(json!({ "name": "Ada", "email": "not-an-address" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(app.router.clone(), Method::GET, "/api/v1/customers/c-404", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.customers.is_empty());

    app.plugin.destroy().await;
}

// ---------------------------------------------------------------------------
// Test: oversized event bodies are refused
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_event_body_is_rejected() {
    let config = ServerConfig {
        max_body_bytes: 256,
        ..common::test_config()
    };
    let app = build_app(&config, inline_config(), Arc::new(NoopTransport))
        .await
        .unwrap();

    let response = post_json(
        app.router.clone(),
        "/api/v1/events",
        json!({ "event_type": "account.registered", "payload": { "note": "x".repeat(1024) } }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    app.plugin.destroy().await;
}

// ---------------------------------------------------------------------------
// Test: responses carry a request id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn responses_echo_request_id() {
    let app = build_app(&common::test_config(), inline_config(), Arc::new(NoopTransport))
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-42");
    app.plugin.destroy().await;
}

// ---------------------------------------------------------------------------
// Test: a mock event with no body passes through the proxy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bodiless_mock_through_proxy() {
    let tmp = tempfile::tempdir().unwrap();
    let notify = NotifyConfig::new(DeliveryMode::Dev)
        .with_dev_output(tmp.path())
        .with_mailbox(MailboxOptions::new(0));
    let app = build_app(&common::test_config(), notify, Arc::new(NoopTransport))
        .await
        .unwrap();

    let response = send(app.router.clone(), Method::POST, "/mailbox/mock/welcome", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["event_type"], "account.registered");
    app.plugin.destroy().await;
}
