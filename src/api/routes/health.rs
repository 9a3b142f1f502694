//! Health check endpoint: surfaces repository connectivity (§6).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::ApiState;

/// `GET /health`
pub async fn health_check(State(state): State<ApiState>) -> Json<Value> {
    let health = state.repository.health_check().await;
    match health {
        Ok(status) => Json(json!({
            "status": if status.healthy { "ok" } else { "degraded" },
            "message": status.message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
        Err(e) => Json(json!({
            "status": "degraded",
            "message": e.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    }
}
