//! Integration tests for dev mode and the dev mailbox server.
//!
//! These tests talk to the mailbox over real HTTP on an ephemeral port.

mod common;

use postbox_events::{DomainEvent, EventBus};
use postbox_notify::mailbox::MailboxOptions;
use postbox_notify::{DeliveryMode, HandlerDefinition, NotifyConfig, NotifyPlugin, TemplatedHandler};
use serde_json::{json, Value};

use common::templates;

async fn dev_plugin(output: &std::path::Path, bus: &EventBus) -> NotifyPlugin {
    let config = NotifyConfig::new(DeliveryMode::Dev)
        .with_dev_output(output)
        .with_mailbox(MailboxOptions::new(0));

    NotifyPlugin::builder(config)
        .templates(templates())
        .handler(
            HandlerDefinition::simple("welcome", "account.registered", TemplatedHandler::new("welcome"))
                .unwrap(),
        )
        .handler(
            HandlerDefinition::simple(
                "goodbye",
                "account.closed",
                TemplatedHandler::new("welcome").subject("Goodbye"),
            )
            .unwrap(),
        )
        .start(bus)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Test: mock events are captured in trigger order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mock_events_are_captured_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let plugin = dev_plugin(tmp.path(), &bus).await;
    let base = format!("http://{}", plugin.mailbox().unwrap().local_addr());
    let client = reqwest::Client::new();

    for (handler, email) in [
        ("welcome", "first@example.com"),
        ("goodbye", "second@example.com"),
        ("welcome", "third@example.com"),
    ] {
        let response: Value = client
            .post(format!("{base}/mock/{handler}"))
            .json(&json!({ "payload": { "email": email, "name": "Ada" } }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["result"]["outcome"], "delivered");
    }

    let entries: Vec<Value> = client.get(format!("{base}/")).send().await.unwrap().json().await.unwrap();
    let recipients: Vec<_> = entries.iter().map(|e| e["recipient"].as_str().unwrap()).collect();
    assert_eq!(recipients, ["first@example.com", "second@example.com", "third@example.com"]);
    assert_eq!(entries[1]["handler_id"], "goodbye");
    assert_eq!(entries[1]["subject"], "Goodbye");

    // Dev mode also wrote every message to the file sink.
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 3);

    plugin.destroy().await;
}

// ---------------------------------------------------------------------------
// Test: unknown handler ids are rejected with a JSON error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mock_event_for_unknown_handler_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let plugin = dev_plugin(tmp.path(), &bus).await;
    let base = format!("http://{}", plugin.mailbox().unwrap().local_addr());

    let response = reqwest::Client::new()
        .post(format!("{base}/mock/missing"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");

    plugin.destroy().await;
}

// ---------------------------------------------------------------------------
// Test: bus events are captured too, and the handler list is served
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bus_events_reach_the_mailbox() {
    let tmp = tempfile::tempdir().unwrap();
    let bus = EventBus::default();
    let plugin = dev_plugin(tmp.path(), &bus).await;
    let base = format!("http://{}", plugin.mailbox().unwrap().local_addr());

    bus.publish(
        DomainEvent::new("account.registered").with_payload(json!({ "email": "ada@example.com" })),
    );
    let store = plugin.mailbox_store().unwrap();
    while store.is_empty() {
        tokio::task::yield_now().await;
    }

    let handlers: Vec<Value> = reqwest::get(format!("{base}/handlers")).await.unwrap().json().await.unwrap();
    assert_eq!(handlers.len(), 2);
    assert_eq!(handlers[0]["id"], "welcome");
    assert_eq!(store.entries()[0].event_type, "account.registered");

    plugin.destroy().await;

    // The server is gone after destroy.
    assert!(reqwest::get(format!("{base}/")).await.is_err());
}
