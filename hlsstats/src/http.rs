//! HTTP surface: heartbeats from players and viewer counts for dashboards.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use hlsstats_core::{metrics, ViewerStats};

#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<ViewerStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamViewersResponse {
    pub stream_id: String,
    pub viewer_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotalViewersResponse {
    pub total_viewer_count: u64,
}

pub fn create_router(stats: Arc<ViewerStats>) -> Router {
    Router::new()
        .route(
            "/streams/{stream_id}/sessions/{session_id}/heartbeat",
            post(heartbeat),
        )
        .route("/streams/{stream_id}/viewers", get(stream_viewers))
        .route("/viewers", get(total_viewers))
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { stats })
}

/// Called once per segment fetch or playlist poll.
async fn heartbeat(
    State(state): State<AppState>,
    Path((stream_id, session_id)): Path<(String, String)>,
) -> StatusCode {
    if stream_id.trim().is_empty() || session_id.trim().is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    state.stats.register_heartbeat(&stream_id, &session_id);
    StatusCode::NO_CONTENT
}

async fn stream_viewers(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Json<StreamViewersResponse> {
    let viewer_count = state.stats.get_viewer_count(&stream_id);
    Json(StreamViewersResponse {
        stream_id,
        viewer_count,
    })
}

async fn total_viewers(State(state): State<AppState>) -> Json<TotalViewersResponse> {
    Json(TotalViewersResponse {
        total_viewer_count: state.stats.get_global_total(),
    })
}

async fn health_check() -> impl IntoResponse {
    "OK"
}

async fn prometheus_metrics() -> Response {
    match metrics::gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
