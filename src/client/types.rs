// src/client/types.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ClientError;

/// Token 获取抽象：生产环境对接外部身份服务，测试里直接给定值
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, ClientError>;

    /// 收到 401 后调用；下次 `token()` 必须返回新值
    fn invalidate(&self);
}

/// 固定 token 实现（invalidate 为空操作）
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, ClientError> {
        Ok(self.token.clone())
    }

    fn invalidate(&self) {}
}

/// 认证方式：Bearer token 或开发模式的 Debug-Sub 头
#[derive(Clone)]
pub enum ClientAuth {
    Bearer(Arc<dyn TokenProvider>),
    DebugSub(String),
}

/// 服务端下发的同步会话
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub epoch: i64,
}
