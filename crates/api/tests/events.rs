//! Integration tests for event ingestion and the mailbox proxy.
//!
//! These boot the demo handler set on a real pipeline and drive it through
//! the HTTP surface.

mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use common::{body_json, get, post_json, send};
use postbox_api::demo::{self, Customer, CustomerDirectory};
use postbox_events::EventBus;
use postbox_notify::mailbox::MailboxOptions;
use postbox_notify::transport::NoopTransport;
use postbox_notify::{DeliveryMode, NotifyConfig, NotifyPlugin};
use serde_json::json;

fn directory() -> Arc<CustomerDirectory> {
    let directory = Arc::new(CustomerDirectory::new());
    directory.insert(
        "c-1",
        Customer {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        },
    );
    directory
}

async fn dev_plugin(output: &std::path::Path, bus: &EventBus) -> NotifyPlugin {
    let mut globals = postbox_core::GlobalVars::new();
    globals.insert("shop".to_string(), json!("Corner Shop"));
    let config = NotifyConfig::new(DeliveryMode::Dev)
        .with_dev_output(output)
        .with_global_vars(globals)
        .with_mailbox(MailboxOptions::new(0));

    NotifyPlugin::builder(config)
        .handlers(demo::handlers().unwrap())
        .templates(demo::templates())
        .injector(Arc::new(demo::services(directory())))
        .start(bus)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Test: a valid event is published and reported as accepted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_event_returns_accepted() {
    let bus = Arc::new(EventBus::default());
    let plugin = NotifyPlugin::builder(NotifyConfig::new(DeliveryMode::Inline))
        .handlers(demo::handlers().unwrap())
        .templates(demo::templates())
        .transport(Arc::new(NoopTransport))
        .start(&bus)
        .await
        .unwrap();
    let app = common::build_test_app(Arc::clone(&bus), Some(&plugin));

    let response = post_json(
        app,
        "/api/v1/events",
        json!({
            "event_type": "account.registered",
            "payload": { "email": "ada@example.com", "name": "Ada" },
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["event_type"], "account.registered");
    assert!(json["data"]["correlation_id"].is_string());
    assert_eq!(json["data"]["subscribers"], 1);

    plugin.destroy().await;
}

// ---------------------------------------------------------------------------
// Test: malformed event types and payloads are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_rejects_invalid_input() {
    let bus = Arc::new(EventBus::default());

    let response = post_json(
        common::build_test_app(Arc::clone(&bus), None),
        "/api/v1/events",
        json!({ "event_type": "Not A Tag" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let response = post_json(
        common::build_test_app(Arc::clone(&bus), None),
        "/api/v1/events",
        json!({ "event_type": "order.placed", "payload": [1, 2] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: published events land in the dev mailbox, read through the proxy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_order_shows_up_in_proxied_mailbox() {
    let tmp = tempfile::tempdir().unwrap();
    let bus = Arc::new(EventBus::default());
    let plugin = dev_plugin(tmp.path(), &bus).await;
    let app = common::build_test_app(Arc::clone(&bus), Some(&plugin));

    let response = post_json(
        app.clone(),
        "/api/v1/events",
        json!({
            "event_type": "order-confirmation",
            "payload": { "customer_id": "c-1", "order": { "number": "A-17" } },
            "locale": "de",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let store = plugin.mailbox_store().unwrap();
    while store.is_empty() {
        tokio::task::yield_now().await;
    }

    let entries = body_json(get(app.clone(), "/mailbox").await).await;
    assert_eq!(entries[0]["recipient"], "ada@example.com");
    assert_eq!(entries[0]["handler_id"], "order-confirmation");

    let cleared = body_json(send(app, Method::DELETE, "/mailbox", None).await).await;
    assert_eq!(cleared["cleared"], 1);

    // Destroy waits for in-flight chains, so the file sink is complete.
    plugin.destroy().await;

    let written = std::fs::read_dir(tmp.path()).unwrap().next().unwrap().unwrap().path();
    let rendered: serde_json::Value = serde_json::from_slice(&std::fs::read(written).unwrap()).unwrap();
    assert_eq!(rendered["to"], "ada@example.com");
    assert_eq!(rendered["subject"], "Bestellung A-17 bestätigt");
    assert_eq!(rendered["body"], "Hallo Ada, danke für deine Bestellung bei Corner Shop.");
}

// ---------------------------------------------------------------------------
// Test: mock events are triggered through the proxy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mock_event_through_proxy() {
    let tmp = tempfile::tempdir().unwrap();
    let bus = Arc::new(EventBus::default());
    let plugin = dev_plugin(tmp.path(), &bus).await;
    let app = common::build_test_app(Arc::clone(&bus), Some(&plugin));

    let health = body_json(get(app.clone(), "/health").await).await;
    assert_eq!(health["mailbox"], true);
    assert_eq!(health["delivery_mode"], "dev");

    let response = post_json(
        app.clone(),
        "/mailbox/mock/welcome",
        json!({ "payload": { "email": "grace@example.com", "name": "Grace" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["result"]["outcome"], "delivered");

    // Unknown customer: the loader fails and nothing is captured.
    let response = post_json(
        app,
        "/mailbox/mock/order-confirmation",
        json!({ "payload": { "customer_id": "c-404" } }),
    )
    .await;
    assert_eq!(body_json(response).await["result"]["outcome"], "failed");
    assert_eq!(plugin.mailbox_store().unwrap().len(), 1);

    plugin.destroy().await;
}
