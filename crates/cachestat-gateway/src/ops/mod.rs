//! Operational HTTP endpoints.
//!
//! - `/healthz`      : liveness
//! - `/cache-status` : shared hit/total/ratio as JSON
//! - `/metrics`      : Prometheus text format

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::app_state::AppState;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn cache_status(State(state): State<AppState>) -> Response {
    let report = tokio::task::spawn_blocking(move || state.status()).await;
    match report {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "cache status snapshot failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = match tokio::task::spawn_blocking(move || state.render_metrics()).await {
        Ok(body) => body,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
