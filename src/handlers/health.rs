// src/handlers/health.rs

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppResult;

use super::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 就绪检查：探活数据库
pub async fn ready_check(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.db.ping().await?;
    Ok(Json(json!({"status": "ready"})))
}
