pub mod customers;
pub mod events;
pub mod health;
pub mod mailbox;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /events                                          publish a domain event (POST)
/// /customers/{id}                                  get, create or replace (GET, PUT)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/events", events::router())
        .nest("/customers", customers::router())
}
