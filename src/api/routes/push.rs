//! Push ingestion endpoint (§6):
//! `GET /api/push/<token>?status=up&msg=...&ping=<int>`.
//!
//! Writes a history row directly through the recorder — this bypasses the
//! scheduler entirely, per §4.2.7: the push monitor's own executor only
//! ever reads `lastCheckAt`, it never advances it.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{ApiError, ApiResult, ApiState};
use crate::model::{CheckResult, Status};

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub ping: Option<i64>,
}

pub async fn ingest(
    State(state): State<ApiState>,
    Path(token): Path<String>,
    Query(query): Query<PushQuery>,
) -> ApiResult<Json<Value>> {
    let monitor = state
        .repository
        .find_monitor_by_push_token(&token)
        .await?
        .ok_or_else(|| ApiError::NotFound("unknown push token".to_string()))?;

    let status = match query.status.as_deref() {
        Some("down") => Status::Down,
        _ => Status::Up,
    };
    let message = query.msg.unwrap_or_else(|| "OK".to_string());

    let result = CheckResult {
        status,
        message,
        ping: query.ping,
        details: None,
    };

    state.recorder.record(&monitor, &result).await?;

    Ok(Json(json!({ "ok": true, "status": status as i32 })))
}
