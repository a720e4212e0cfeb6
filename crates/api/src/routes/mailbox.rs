//! Reverse proxy to the dev mailbox.
//!
//! The mailbox listens on its own loopback port; this mounts it under the
//! host's `/{route}` so browsers only need the API origin.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::routing::any;
use axum::Router;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Forward the request, minus the mount prefix, to the mailbox server.
///
/// Only `content-type` is carried over, and only when the caller sent one,
/// so a bodiless mock request reaches the mailbox unchanged.
async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let target = state
        .mailbox
        .as_ref()
        .ok_or_else(|| AppError::NotFound("dev mailbox is not running".to_string()))?;

    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("http://{}{}", target.addr, path);

    let mut request = state.http.request(method, &url);
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        request = request.header(CONTENT_TYPE, content_type.clone());
    }
    let upstream = request
        .body(body)
        .send()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let mut response = Response::builder().status(status);
    if let Some(content_type) = content_type {
        response = response.header(CONTENT_TYPE, content_type);
    }
    response
        .body(Body::from(bytes))
        .map_err(|e| AppError::Upstream(e.to_string()))
}

/// Routes mounted at `/{route}`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", any(forward))
        .route("/{*path}", any(forward))
}
