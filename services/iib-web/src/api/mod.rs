//! HTTP API handlers and routing.

pub mod authz;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod request_context;
pub mod v1;

use axum::{
    http::{header, Method},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{
        MakeRequestId, PropagateRequestIdLayer, RequestId as TowerRequestId, SetRequestIdLayer,
    },
    trace::TraceLayer,
};

use crate::state::AppState;

/// Generates a per-request correlation id when the caller didn't send its
/// own `x-request-id`. Not a `RequestId` in the domain sense (that id is
/// database-assigned) — just a random value for log correlation.
#[derive(Clone, Copy)]
struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<TowerRequestId> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let header_value = axum::http::HeaderValue::from_str(&correlation_id).ok()?;
        Some(TowerRequestId::new(header_value))
    }
}

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(Any);

    let request_id_header = header::HeaderName::from_static("x-request-id");
    let set_request_id = SetRequestIdLayer::new(request_id_header.clone(), MakeCorrelationId);
    let propagate_request_id = PropagateRequestIdLayer::new(request_id_header);

    Router::new()
        // Ops probes (no auth required, outside the versioned API).
        .merge(health::routes())
        // Versioned API (SPEC_FULL.md §6 prefix).
        .nest("/api/v1", v1::routes())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .layer(cors)
        // Application state
        .with_state(state)
}
