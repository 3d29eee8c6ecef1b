//! Liveness endpoint.

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::auth::AppState;

/// Reports that the process is up.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}
