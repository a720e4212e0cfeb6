//! Built-in handler set served by the `postbox-api` binary.
//!
//! Two notifications are wired up:
//!
//! - `order-confirmation`: loads the customer from [`CustomerDirectory`]
//!   before addressing the confirmation.
//! - `account.registered`: a plain templated welcome message.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use async_trait::async_trait;
use postbox_core::{GlobalVars, NotificationPayload};
use postbox_notify::{
    BootstrapError, DataContext, EnrichedEventHandler, EventEnvelope, HandlerDefinition, HandlerError,
    HandlerResult, ServiceRegistry, Template, TemplateSet, TemplatedHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const ORDER_CONFIRMATION: &str = "order-confirmation";
pub const ACCOUNT_REGISTERED: &str = "account.registered";

/// A customer as known to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
}

/// In-memory customer lookup, standing in for the host's own store.
#[derive(Debug, Default)]
pub struct CustomerDirectory {
    customers: RwLock<HashMap<String, Customer>>,
}

impl CustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a JSON object mapping customer id to `{ name, email }`.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read customers file {}", path.display()))?;
        let customers: HashMap<String, Customer> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid customers file {}", path.display()))?;
        Ok(Self {
            customers: RwLock::new(customers),
        })
    }

    pub fn insert(&self, id: impl Into<String>, customer: Customer) {
        self.customers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), customer);
    }

    pub fn get(&self, id: &str) -> Option<Customer> {
        self.customers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.customers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Confirms an order to the customer named by `payload.customer_id`.
pub struct OrderConfirmation;

#[async_trait]
impl EnrichedEventHandler for OrderConfirmation {
    type Data = Customer;

    async fn load_data(&self, ctx: &DataContext<'_>) -> Result<Customer, HandlerError> {
        let directory = ctx.inject::<CustomerDirectory>()?;
        let id = ctx.event().payload["customer_id"]
            .as_str()
            .ok_or_else(|| HandlerError::msg("event has no customer_id"))?;
        directory
            .get(id)
            .ok_or_else(|| HandlerError::msg(format!("customer {id} not found")))
    }

    async fn handle(
        &self,
        envelope: &EventEnvelope<'_, Customer>,
        globals: &GlobalVars,
    ) -> HandlerResult {
        let customer = envelope.data();
        let event = envelope.event();
        let mut payload = NotificationPayload::new(&customer.email, ORDER_CONFIRMATION)
            .with_vars(json!({
                "order": event.payload.get("order").cloned().unwrap_or_else(|| json!({})),
                "customer": { "name": customer.name },
            }))
            .merge_globals(globals);
        if let Some(locale) = &event.locale {
            payload = payload.with_locale(locale);
        }
        Ok(Some(payload))
    }
}

pub fn handlers() -> Result<Vec<HandlerDefinition>, BootstrapError> {
    Ok(vec![
        HandlerDefinition::with_async_data(ORDER_CONFIRMATION, ORDER_CONFIRMATION, OrderConfirmation)?,
        HandlerDefinition::simple("welcome", ACCOUNT_REGISTERED, TemplatedHandler::new("welcome"))?,
    ])
}

pub fn templates() -> TemplateSet {
    TemplateSet::new()
        .with(
            ORDER_CONFIRMATION,
            Template::new(
                "Order {{ order.number }} confirmed",
                "Hi {{ customer.name }}, thanks for your order at {{ shop }}.",
            ),
        )
        .with(
            "order-confirmation.de",
            Template::new(
                "Bestellung {{ order.number }} bestätigt",
                "Hallo {{ customer.name }}, danke für deine Bestellung bei {{ shop }}.",
            ),
        )
        .with(
            "welcome",
            Template::new("Welcome to {{ shop }}", "Hello {{ name }}, your account is ready."),
        )
}

/// Services available to data loaders.
pub fn services(directory: Arc<CustomerDirectory>) -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry.provide(directory);
    registry
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn seeds_directory_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "c-9": {{ "name": "Grace", "email": "grace@example.com" }} }}"#).unwrap();

        let directory = CustomerDirectory::from_json_file(file.path()).unwrap();

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("c-9").unwrap().email, "grace@example.com");
    }

    #[test]
    fn malformed_customers_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();

        let err = CustomerDirectory::from_json_file(file.path()).unwrap_err();

        assert!(err.to_string().contains("Invalid customers file"));
    }
}
