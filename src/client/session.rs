// src/client/session.rs

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::error::ClientError;
use super::types::{ClientAuth, ClientSession};

/// 本地缓存上限。同步会话本身 30 分钟就过期，所以实际生效的是服务端
/// 下发的 expiresAt；23 小时只约束更长寿的 token 交换会话。
const SESSION_CACHE_TTL_HOURS: i64 = 23;

/// 到期前提前刷新的缓冲，避免请求在途中撞上过期
const SESSION_REFRESH_BUFFER_SECS: i64 = 60;

struct CachedSession {
    session: ClientSession,
    expiry: DateTime<Utc>,
}

/// 客户端会话缓存：进程内单条目。并发的 `ensure_session` 在写锁上
/// 双重检查，冷缓存下也只会发出一次创建请求。
pub struct SessionManager {
    base_url: String,
    http: reqwest::Client,
    auth: ClientAuth,
    cached: RwLock<Option<CachedSession>>,
}

impl SessionManager {
    pub fn new(base_url: impl Into<String>, auth: ClientAuth) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            auth,
            cached: RwLock::new(None),
        }
    }

    /// 返回一个可用的会话，必要时创建或刷新
    pub async fn ensure_session(&self) -> Result<ClientSession, ClientError> {
        let buffer = Duration::seconds(SESSION_REFRESH_BUFFER_SECS);

        // 快路径：读锁检查缓存
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if Utc::now() + buffer < entry.expiry {
                    return Ok(entry.session.clone());
                }
            }
        }

        self.create_session().await
    }

    /// 清空缓存（epoch 不一致时调用）；下一次 `ensure_session` 会
    /// 创建带新 epoch 的会话
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
        tracing::debug!("invalidated cached session");
    }

    async fn create_session(&self) -> Result<ClientSession, ClientError> {
        let mut guard = self.cached.write().await;

        // 双重检查：等待写锁期间可能已有并发任务建好了会话
        let buffer = Duration::seconds(SESSION_REFRESH_BUFFER_SECS);
        if let Some(entry) = guard.as_ref() {
            if Utc::now() + buffer < entry.expiry {
                return Ok(entry.session.clone());
            }
        }

        let url = format!("{}/v1/sync/sessions", self.base_url);
        let mut req = self.http.post(&url);
        match &self.auth {
            ClientAuth::Bearer(provider) => {
                req = req.bearer_auth(provider.token().await?);
            }
            ClientAuth::DebugSub(sub) => {
                req = req.header("Debug-Sub", sub);
            }
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::SessionCreate(format!(
                "session creation failed with status {status}"
            )));
        }

        // epoch 以响应头为准，响应体兜底
        let header_epoch = resp
            .headers()
            .get("epoch")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok());

        let mut session: ClientSession = resp
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        if let Some(epoch) = header_epoch {
            session.epoch = epoch;
        }

        let expiry = session
            .expires_at
            .min(session.created_at + Duration::hours(SESSION_CACHE_TTL_HOURS));

        tracing::info!(
            session_id = %session.id,
            epoch = session.epoch,
            expires_at = %expiry,
            "created new session"
        );

        *guard = Some(CachedSession {
            session: session.clone(),
            expiry,
        });

        Ok(session)
    }
}
