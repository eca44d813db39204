//! Health check endpoints.
//!
//! `/api/v1/healthcheck` is the literal spec endpoint (SPEC_FULL.md §6): a
//! DB ping, 200 or 500. `/healthz` and `/readyz` are an ambient addition for
//! orchestration probes, grounded in the teacher's liveness/readiness split,
//! mounted outside the versioned API prefix since they are ops surfaces
//! rather than part of it.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
struct HealthBody {
    status: &'static str,
}

/// `GET /api/v1/healthcheck`: DB ping; 200 or 500.
pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    match state.db().health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthBody { status: "ok" })),
        Err(e) => {
            tracing::error!(error = %e, "healthcheck: database ping failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthBody { status: "unavailable" }),
            )
        }
    }
}

/// Ops probe routes, mounted at the root rather than under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(livez))
        .route("/readyz", get(readyz))
}

/// Minimal liveness probe: the process is up.
async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: the database is reachable.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.db().health_check().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_livez_returns_ok() {
        let response = livez().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
