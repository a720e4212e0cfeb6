//! HTTP surface of the host service.
//!
//! ```text
//! GET    /health                      liveness plus delivery mode
//! POST   /api/v1/events               publish a domain event
//! GET    /api/v1/customers/{id}       look up a customer
//! PUT    /api/v1/customers/{id}       create or replace a customer
//! ANY    /{mailbox_route}/...         dev mailbox proxy (dev mode only)
//! ```

use std::time::Duration;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID: &str = "x-request-id";

/// Build the application [`Router`] with its middleware.
///
/// Layers run outermost first: request id, tracing, request id echo, CORS,
/// timeout, panic recovery. Request bodies above `max_body_bytes` are
/// rejected with 413 before any handler parses them.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> anyhow::Result<Router> {
    let request_id = HeaderName::from_static(REQUEST_ID);

    let mut app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes());

    if let Some(mailbox) = &state.mailbox {
        app = app.nest(&format!("/{}", mailbox.route), routes::mailbox::router());
    }

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(CatchPanicLayer::new());

    Ok(app
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware)
        .with_state(state))
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

/// CORS for browser clients of the event and customer routes.
///
/// Only JSON bodies are sent, and no cookies, so credentials stay off.
fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| anyhow::anyhow!("Invalid CORS origin '{origin}': {e}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(REQUEST_ID)])
        .max_age(Duration::from_secs(600)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_origin() {
        let err = cors_layer(&["http://ok.test".into(), "bad\norigin".into()]).unwrap_err();
        assert!(err.to_string().contains("Invalid CORS origin"));
    }

    #[test]
    fn request_span_tolerates_missing_request_id() {
        let request = Request::post("/api/v1/events").body(Body::empty()).unwrap();
        let _span = request_span(&request);
    }
}
