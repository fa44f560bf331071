// src/handlers/sync.rs

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::models::{EntityKind, PullPage, PushAck};
use crate::sync::{normalize_limit, Cursor};

use super::AppState;

fn resolve_kind(segment: &str) -> AppResult<EntityKind> {
    EntityKind::from_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown entity kind: {segment}")))
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub items: Vec<Value>,
}

/// POST /v1/sync/{kind}/push
pub async fn push(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(kind): Path<String>,
    Json(req): Json<PushRequest>,
) -> AppResult<Json<Vec<PushAck>>> {
    let kind = resolve_kind(&kind)?;
    let acks = state.engine.push(&user_id, kind, &req.items).await?;
    Ok(Json(acks))
}

#[derive(Debug, Deserialize)]
pub struct PullQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /v1/sync/{kind}/pull?cursor=&limit=
pub async fn pull(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(kind): Path<String>,
    Query(query): Query<PullQuery>,
) -> AppResult<Json<PullPage>> {
    let kind = resolve_kind(&kind)?;
    let cursor = Cursor::decode(query.cursor.as_deref().unwrap_or_default());
    let limit = normalize_limit(query.limit);

    let page = state.engine.pull(&user_id, kind, cursor, limit).await?;
    Ok(Json(page))
}
