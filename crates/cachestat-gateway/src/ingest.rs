//! Lookup outcome intake from the cache layer.
//!
//! `POST /v1/lookup/:outcome` always answers 202 for a known outcome: counting
//! problems are the module's business, never the caller's.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use cachestat_core::CacheOutcome;

use crate::app_state::AppState;
use crate::host::{HookStatus, RequestInfo};

pub async fn report_lookup(
    State(state): State<AppState>,
    Path(outcome): Path<String>,
    method: Method,
    uri: Uri,
) -> Response {
    let outcome: CacheOutcome = match outcome.parse() {
        Ok(o) => o,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let req = RequestInfo {
        method: method.to_string(),
        uri: uri.to_string(),
    };

    // The hook may block on the cross-process lock.
    match tokio::task::spawn_blocking(move || state.record(outcome, &req)).await {
        Ok(HookStatus::Counted(counters)) => tracing::debug!(%outcome, %counters, "lookup counted"),
        Ok(HookStatus::Ignored) | Ok(HookStatus::Skipped) => {}
        Err(e) => tracing::warn!(error = %e, %outcome, "cache status hook task failed"),
    }

    StatusCode::ACCEPTED.into_response()
}
