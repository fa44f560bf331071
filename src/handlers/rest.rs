// src/handlers/rest.rs
//
// 单条 REST 变更层。同步推送是批量 LWW，而 UI 按钮、自动化这类路径
// 需要逐条乐观并发控制：携带 expectedVersion 的写入在版本不一致时
// 直接 409，写入时间戳取 max(now, stored+1) 保证时钟停滞下仍单调。

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::models::{EntityKind, RestItem, RestPage};
use crate::sync::extract::extract;
use crate::sync::{normalize_limit, Cursor};
use crate::utils::{now_ms, rfc3339_ms};

use super::AppState;

fn resolve_kind(segment: &str) -> AppResult<EntityKind> {
    EntityKind::from_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown entity kind: {segment}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub payload: Value,
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub force_timestamp_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// GET /v1/{kind}/{uid}
pub async fn get_entity(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path((kind, uid)): Path<(String, Uuid)>,
) -> AppResult<Json<RestItem>> {
    let kind = resolve_kind(&kind)?;
    let row = state
        .store
        .get_by_uid(&user_id, kind, uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("entity {uid} not found")))?;

    Ok(Json(row.into()))
}

/// GET /v1/{kind}?cursor=&limit=&includeDeleted=
pub async fn list_entities(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<RestPage>> {
    let kind = resolve_kind(&kind)?;
    let cursor = Cursor::decode(query.cursor.as_deref().unwrap_or_default());
    let limit = normalize_limit(query.limit);

    let (rows, next) = state
        .store
        .list(&user_id, kind, cursor, limit, query.include_deleted)
        .await?;

    Ok(Json(RestPage {
        items: rows.into_iter().map(Into::into).collect(),
        next_cursor: next.map(|c| c.encode()),
    }))
}

/// POST /v1/{kind} — uid 由客户端在 payload 中铸造
pub async fn create_entity(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(kind): Path<String>,
    Json(req): Json<MutationRequest>,
) -> AppResult<(StatusCode, Json<RestItem>)> {
    let kind = resolve_kind(&kind)?;
    let uid = req
        .payload
        .get("uid")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::ValidationError("invalid payload: missing uid".to_string()))?;

    let item = mutate(
        &state,
        &user_id,
        kind,
        uid,
        req.payload,
        req.expected_version,
        false,
        req.force_timestamp_ms,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// PATCH /v1/{kind}/{uid}
pub async fn update_entity(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path((kind, uid)): Path<(String, Uuid)>,
    Json(req): Json<MutationRequest>,
) -> AppResult<Json<RestItem>> {
    let kind = resolve_kind(&kind)?;
    let item = mutate(
        &state,
        &user_id,
        kind,
        uid,
        req.payload,
        req.expected_version,
        false,
        req.force_timestamp_ms,
    )
    .await?;

    Ok(Json(item))
}

/// DELETE /v1/{kind}/{uid} — 软删除，返回墓碑化后的实体
pub async fn delete_entity(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path((kind, uid)): Path<(String, Uuid)>,
    Query(query): Query<DeleteQuery>,
) -> AppResult<Json<RestItem>> {
    let kind = resolve_kind(&kind)?;

    let existing = state
        .store
        .get_by_uid(&user_id, kind, uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("entity {uid} not found")))?;

    let item = mutate(
        &state,
        &user_id,
        kind,
        uid,
        existing.payload,
        query.expected_version,
        true,
        None,
    )
    .await?;

    Ok(Json(item))
}

/// 核心变更流程：探测 → 版本检查 → 计算写入时间戳 → LWW upsert →
/// 把服务端版本补回 payload.sync.version
#[allow(clippy::too_many_arguments)]
async fn mutate(
    state: &AppState,
    user_id: &str,
    kind: EntityKind,
    uid: Uuid,
    mut payload: Value,
    expected_version: Option<i64>,
    force_deleted: bool,
    force_timestamp_ms: Option<i64>,
) -> AppResult<RestItem> {
    if !payload.is_object() {
        return Err(AppError::ValidationError(
            "payload must be a JSON object".to_string(),
        ));
    }
    payload["uid"] = json!(uid.to_string());

    let mut tx = state.db.begin().await?;

    let probed = state.store.probe(&mut tx, user_id, kind, uid).await?;

    if let (Some(expected), Some((_, actual))) = (expected_version, probed) {
        if expected != actual {
            return Err(AppError::VersionMismatch { expected, actual });
        }
    }

    let stored_ms = probed.map(|(ms, _)| ms);

    // 时钟停滞时也要前进：没有显式时间戳就取 max(now, stored+1)
    let write_ms = force_timestamp_ms
        .unwrap_or_else(|| stored_ms.map_or_else(now_ms, |ms| now_ms().max(ms + 1)));

    if !payload.get("sync").map_or(false, Value::is_object) {
        payload["sync"] = json!({});
    }
    payload["sync"]["updatedAtMs"] = json!(write_ms);
    if force_deleted {
        payload["sync"]["deletedAtMs"] = json!(write_ms);
    }

    let item = extract(kind, &payload).map_err(AppError::ValidationError)?;

    if item.deleted_at_ms.is_none() {
        if let Some(reason) = state
            .store
            .check_parent(&mut tx, user_id, &item.parent)
            .await?
        {
            return Err(AppError::ValidationError(reason));
        }
    }

    let (server_version, server_ms) = state.store.upsert(&mut tx, user_id, kind, &item).await?;

    // LWW 裁决：只有写入真正生效时才补丁 payload；force_timestamp_ms
    // 不比已存时间戳新时行保持原样，返回服务端现状
    let won = stored_ms.map_or(true, |ms| write_ms > ms);

    let result = if won {
        payload["sync"]["version"] = json!(server_version);
        state
            .store
            .update_payload(&mut tx, user_id, kind, uid, &payload)
            .await?;

        RestItem {
            uid: uid.to_string(),
            version: server_version,
            updated_at: rfc3339_ms(server_ms),
            deleted_at: item.deleted_at_ms.map(rfc3339_ms),
            payload,
        }
    } else {
        let row = state
            .store
            .get_by_uid_tx(&mut tx, user_id, kind, uid)
            .await?
            .ok_or_else(|| AppError::InternalError("row vanished during mutation".to_string()))?;
        row.into()
    };

    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        entity = kind.table(),
        uid = %uid,
        version = result.version,
        deleted = force_deleted,
        "rest_mutation_completed"
    );

    Ok(result)
}
