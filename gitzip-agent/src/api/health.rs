//! Health check endpoints.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::OnceLock;
use std::time::Instant;

use super::AppState;

static START_TIME: OnceLock<Instant> = OnceLock::new();

pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = START_TIME.get().map_or(0, |start| start.elapsed().as_secs());
    let summary = state.queue.summary();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime,
        "running_job": state.queue.running_job(),
        "queue": summary,
    }))
}

/// GET /version - Version information endpoint
pub async fn version() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "build": if cfg!(debug_assertions) { "dev" } else { "release" },
        "features": ["deflate"],
    }))
}
