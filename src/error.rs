// src/error.rs

use axum::{
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub static EPOCH_HEADER: HeaderName = HeaderName::from_static("epoch");

/// Wire shape for every error response: a human-readable `error` string plus
/// machine fields for the kinds that carry them.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorBody {
    fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            epoch: None,
            expected: None,
            actual: None,
            correlation_id: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("session not found or expired")]
    SessionMissing,

    #[error("epoch_mismatch")]
    EpochMismatch { epoch: i64 },

    #[error("version mismatch: expected {expected}, actual {actual}")]
    VersionMismatch { expected: i64, actual: i64 },

    #[error("confirmation required: must send confirm=\"WIPE\"")]
    WipeNotConfirmed,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// 整批推送失败（事务无法打开或提交），不返回任何部分 ack
    #[error("batch failed: {0}")]
    BatchFatal(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, mut body) = match &self {
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, ErrorBody::new(msg.clone())),
            AppError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, ErrorBody::new(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorBody::new(msg.clone())),
            AppError::SessionMissing => {
                (StatusCode::NOT_FOUND, ErrorBody::new(self.to_string()))
            }
            AppError::EpochMismatch { epoch } => {
                let mut body = ErrorBody::new("epoch_mismatch");
                body.epoch = Some(*epoch);
                (StatusCode::CONFLICT, body)
            }
            AppError::VersionMismatch { expected, actual } => {
                let mut body = ErrorBody::new(self.to_string());
                body.expected = Some(*expected);
                body.actual = Some(*actual);
                (StatusCode::CONFLICT, body)
            }
            AppError::WipeNotConfirmed => (StatusCode::BAD_REQUEST, ErrorBody::new(self.to_string())),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg.clone())),
            AppError::ConfigError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(msg.clone()))
            }
            AppError::DatabaseError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(e.to_string()),
            ),
            AppError::SerializationError(e) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new(e.to_string()))
            }
            AppError::BatchFatal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(msg.clone()))
            }
            AppError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(msg.clone()))
            }
        };

        // 错误响应体始终带上本次请求的关联 ID，客户端从 5xx 的 body
        // 里也能取回它
        body.correlation_id = crate::middleware::current_correlation_id();

        let mut response = (status, Json(body)).into_response();

        // Epoch mismatch mirrors the server value in the response header so
        // clients can recover without parsing the body.
        if let AppError::EpochMismatch { epoch } = &self {
            if let Ok(value) = HeaderValue::from_str(&epoch.to_string()) {
                response.headers_mut().insert(EPOCH_HEADER.clone(), value);
            }
        }

        response
    }
}
