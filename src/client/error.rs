// src/client/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed")]
    AuthFailed,

    #[error("session creation failed: {0}")]
    SessionCreate(String),

    /// 客户端落后于服务端代数，需要丢弃本地状态重新全量同步
    #[error("epoch mismatch: server epoch {server_epoch} (data reset required)")]
    EpochMismatch { server_epoch: i64 },

    /// 乐观并发失败，原样交给调用方处理
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: i64, actual: i64 },

    #[error("rate limited (retry after {retry_after_secs} seconds)")]
    RateLimited { retry_after_secs: u64 },

    #[error("request cancelled")]
    Cancelled,

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
