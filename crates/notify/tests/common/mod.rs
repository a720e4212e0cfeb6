use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use postbox_notify::render::{RenderedMessage, Template, TemplateSet};
use postbox_notify::transport::{Transport, TransportError};
use tokio::sync::mpsc;

/// Transport that hands every message to the test over a channel.
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<RenderedMessage>,
    sent: AtomicUsize,
}

impl ChannelTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RenderedMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sender,
            sent: AtomicUsize::new(0),
        });
        (transport, receiver)
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), TransportError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(message.clone());
        Ok(())
    }
}

/// Templates used across the integration tests.
pub fn templates() -> TemplateSet {
    TemplateSet::new()
        .with(
            "order-confirmation",
            Template::new(
                "Order {{ order.number }} confirmed",
                "Hi {{ customer.name }}, thanks for shopping at {{ shop }}.",
            ),
        )
        .with("welcome", Template::new("Welcome", "Hello {{ name }}"))
}

/// Wait for the next message, failing the test after a second.
pub async fn next_message(receiver: &mut mpsc::UnboundedReceiver<RenderedMessage>) -> RenderedMessage {
    tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .expect("message within 1s")
        .expect("transport still alive")
}
