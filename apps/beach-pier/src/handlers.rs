use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::state::PierState;

pub const BANNER: &str = "Beach Pier signaling server is running.";

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub registered_endpoints: usize,
    pub active_connections: usize,
}

pub async fn banner() -> &'static str {
    BANNER
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn stats(State(state): State<PierState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        registered_endpoints: state.router().registry().len(),
        active_connections: state.active_connections(),
    })
}

pub async fn metrics_handler(State(state): State<PierState>) -> Response {
    match state.render_metrics() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
