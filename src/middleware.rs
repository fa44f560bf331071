// src/middleware.rs

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, EPOCH_HEADER};
use crate::handlers::AppState;

pub static CORRELATION_HEADER: HeaderName = HeaderName::from_static("correlation-id");
pub static SESSION_HEADER: HeaderName = HeaderName::from_static("session-id");

/// 请求关联 ID，贯穿日志与响应头
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// 当前请求的关联 ID。仅在 `correlation_middleware` 的作用域内有值，
/// 错误响应体靠它带上 correlation_id 字段。
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(Clone::clone).ok()
}

/// 接受客户端的 Correlation-ID，缺失时生成一个；写入 extensions 与
/// task-local 作用域，并在响应头回显
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(&CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = CORRELATION_ID
        .scope(correlation_id.clone(), next.run(request))
        .await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response
            .headers_mut()
            .insert(CORRELATION_HEADER.clone(), value);
    }

    response
}

/// 会话与 epoch 守卫（认证之后运行）。
///
/// 携带 Epoch 的请求必须与服务端 epoch 一致，不一致时以 409 返回服务端
/// 值；携带 Session-Id 的请求必须对应一个属于当前用户的存活会话。
/// Epoch 先于会话检查：wipe 之后客户端的会话和 epoch 同时失效，此时
/// 必须让它看到 409 epoch_mismatch（恢复信号）而不是 404。创建会话的
/// 请求天然不带这两个头，不受影响。
pub async fn sync_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = request
        .extensions()
        .get::<CurrentUser>()
        .map(|u| u.0.clone())
        .ok_or_else(|| AppError::AuthError("Missing authentication token".to_string()))?;

    if let Some(raw) = request.headers().get(&EPOCH_HEADER) {
        let client_epoch: i64 = raw
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| AppError::ValidationError("invalid epoch header".to_string()))?;

        state.epochs.enforce(&user_id, client_epoch).await?;
    }

    if let Some(raw) = request.headers().get(&SESSION_HEADER) {
        let session_id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or(AppError::SessionMissing)?;

        let session = state
            .sessions
            .get(session_id)
            .await
            .ok_or(AppError::SessionMissing)?;

        if session.user_id != user_id {
            return Err(AppError::PermissionDenied("forbidden".to_string()));
        }
    }

    Ok(next.run(request).await)
}
