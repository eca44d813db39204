//! API v1 routes: the `/builds*` dispatcher surface plus the literal
//! `/healthcheck` endpoint (SPEC_FULL.md §6).

pub mod builds;

use axum::Router;

use crate::api::health;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/builds", builds::routes())
        .route("/healthcheck", axum::routing::get(health::healthcheck))
}
