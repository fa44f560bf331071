// src/auth/middleware.rs

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::{AppError, AppResult};

use super::jwt::JwtService;

/// Dev-only impersonation header; honored only when `auth.dev_mode` is set.
pub const DEBUG_SUB_HEADER: &str = "debug-sub";

#[derive(Clone)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
    pub dev_mode: bool,
}

/// 请求经过认证后注入 extensions 的当前用户（owner id）
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

/// 认证中间件 - 提取并验证 Bearer JWT；开发模式下允许 Debug-Sub 头直接指定用户
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = authenticate(&auth_state, &request)?;
    request.extensions_mut().insert(CurrentUser(user_id));

    Ok(next.run(request).await)
}

fn authenticate(state: &AuthState, request: &Request) -> AppResult<String> {
    if let Some(auth_header) = request.headers().get(AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::AuthError("Invalid authorization header".to_string()))?;

        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            let token_data = state.jwt_service.validate_token(token)?;
            return Ok(token_data.claims.sub);
        }
        return Err(AppError::AuthError(
            "Invalid authorization header".to_string(),
        ));
    }

    // 开发模式：Debug-Sub 头直接充当 subject
    if state.dev_mode {
        if let Some(debug_sub) = request.headers().get(DEBUG_SUB_HEADER) {
            let sub = debug_sub
                .to_str()
                .map_err(|_| AppError::AuthError("Invalid Debug-Sub header".to_string()))?;
            if !sub.is_empty() {
                return Ok(sub.to_string());
            }
        }
    }

    Err(AppError::AuthError(
        "Missing authentication token".to_string(),
    ))
}
