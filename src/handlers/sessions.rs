// src/handlers/sessions.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult, EPOCH_HEADER};

use super::AppState;

/// POST /v1/sync/sessions
///
/// 为当前用户创建同步会话；epoch 来自懒初始化的 owner_state，
/// 同时通过响应头下发。
pub async fn begin_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> AppResult<impl IntoResponse> {
    let epoch = state.epochs.ensure_owner(&user_id).await?;
    let session = state.sessions.create(&user_id, epoch).await;

    tracing::info!(
        session_id = %session.id,
        user_id = %user_id,
        epoch,
        expires_at = %session.expires_at,
        "sync session created"
    );

    Ok((
        StatusCode::CREATED,
        [(EPOCH_HEADER.clone(), epoch.to_string())],
        Json(session),
    ))
}

/// GET /v1/sync/sessions/{id}（调试用）
pub async fn get_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or(AppError::SessionMissing)?;

    // 只能查看自己的会话
    if session.user_id != user_id {
        return Err(AppError::PermissionDenied("forbidden".to_string()));
    }

    Ok(Json(session))
}

/// DELETE /v1/sync/sessions/{id}
pub async fn end_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or(AppError::SessionMissing)?;

    if session.user_id != user_id {
        return Err(AppError::PermissionDenied("forbidden".to_string()));
    }

    state.sessions.delete(session_id).await;

    tracing::info!(session_id = %session_id, user_id = %user_id, "sync session ended");

    Ok(StatusCode::NO_CONTENT)
}
