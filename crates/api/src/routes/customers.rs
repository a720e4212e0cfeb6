//! Customer directory maintenance.
//!
//! The order-confirmation handler looks customers up here, so a customer
//! must exist before their orders can be confirmed.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::demo::Customer;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `PUT /api/v1/customers/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpsertCustomer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CustomerView {
    pub id: String,
    #[serde(flatten)]
    pub customer: Customer,
}

/// PUT /api/v1/customers/{id} -- create or replace a customer.
async fn upsert_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpsertCustomer>,
) -> AppResult<Json<DataResponse<CustomerView>>> {
    let name = input.name.trim();
    let email = input.email.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest(format!("'{email}' is not an email address")));
    }

    let customer = Customer {
        name: name.to_string(),
        email: email.to_string(),
    };
    state.customers.insert(id.clone(), customer.clone());
    tracing::debug!(customer_id = %id, "Customer stored");

    Ok(Json(DataResponse {
        data: CustomerView { id, customer },
    }))
}

/// GET /api/v1/customers/{id}
async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<CustomerView>>> {
    let customer = state
        .customers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("customer {id}")))?;
    Ok(Json(DataResponse {
        data: CustomerView { id, customer },
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_customer).put(upsert_customer))
}
