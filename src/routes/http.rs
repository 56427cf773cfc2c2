// GET handlers: version, api/summary, api/top

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version: service name and version from Cargo.toml.
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        axum::Json(serde_json::json!({ "error": "no accounting cycle has completed yet" })),
    )
        .into_response()
}

/// GET /api/summary: the whole latest snapshot.
pub(super) async fn summary_handler(State(state): State<AppState>) -> Response {
    let latest = state.summary_rx.borrow().clone();
    match latest {
        Some(snapshot) => axum::Json(snapshot.as_ref().clone()).into_response(),
        None => not_ready(),
    }
}

/// GET /api/top: just the two rankings.
pub(super) async fn top_handler(State(state): State<AppState>) -> Response {
    let latest = state.summary_rx.borrow().clone();
    match latest {
        Some(snapshot) => axum::Json(serde_json::json!({
            "timestamp": snapshot.timestamp,
            "entityKind": snapshot.entity_kind,
            "topInterval": snapshot.top_interval,
            "topCumulative": snapshot.top_cumulative,
        }))
        .into_response(),
        None => not_ready(),
    }
}
