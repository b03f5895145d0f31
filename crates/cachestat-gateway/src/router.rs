//! Axum router wiring.
//!
//! Ops endpoints plus the lookup intake used by the cache layer.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, ingest, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/cache-status", get(ops::cache_status))
        .route("/metrics", get(ops::metrics))
        .route("/v1/lookup/:outcome", post(ingest::report_lookup))
        .with_state(state)
}
