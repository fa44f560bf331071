// src/client/http.rs

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::{PullPage, PushAck};

use super::error::ClientError;
use super::session::SessionManager;
use super::types::ClientAuth;

/// 每个逻辑调用最多尝试次数
pub const MAX_ATTEMPTS: u32 = 3;

/// 无 Retry-After 头时指数退避的起点
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// 取消句柄：cancel() 之后所有退避等待立即结束
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: String,
    #[serde(default)]
    epoch: Option<i64>,
    #[serde(default)]
    expected: Option<i64>,
    #[serde(default)]
    actual: Option<i64>,
}

/// 认证/会话/关联头自动注入 + 有界重试的 HTTP 客户端。
///
/// 恢复策略：401 失效 token 缓存重试一次；409 epoch_mismatch 失效会话
/// 缓存重试（下一次尝试会创建带新 epoch 的会话）；其它 409 原样返回；
/// 429 按 Retry-After 或指数退避等待。网络错误与 5xx 不在本层重试。
/// 请求体以 JSON 值形式缓存，天然可重放；认证/会话/关联头每次尝试
/// 重新计算，绝不沿用上一次的值。
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    auth: ClientAuth,
    sessions: Option<Arc<SessionManager>>,
    cancel: CancelHandle,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, auth: ClientAuth) -> Self {
        let base_url = base_url.into();
        let sessions = Arc::new(SessionManager::new(base_url.clone(), auth.clone()));
        Self {
            base_url,
            http: reqwest::Client::new(),
            auth,
            sessions: Some(sessions),
            cancel: CancelHandle::default(),
        }
    }

    /// 不带会话头的变体（探活、能力查询等无会话语义的调用）
    pub fn without_sessions(base_url: impl Into<String>, auth: ClientAuth) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            auth,
            sessions: None,
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn session_manager(&self) -> Option<Arc<SessionManager>> {
        self.sessions.clone()
    }

    /// 执行一次逻辑调用，带头注入与重试
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, ClientError> {
        let correlation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.base_url, path);

        let mut attempt: u32 = 0;
        let mut token_refreshed = false;

        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            // 每次尝试重新注入全部头
            let mut req = self
                .http
                .request(method.clone(), &url)
                .header("Correlation-ID", &correlation_id);

            match &self.auth {
                ClientAuth::Bearer(provider) => {
                    req = req.bearer_auth(provider.token().await?);
                }
                ClientAuth::DebugSub(sub) => {
                    req = req.header("Debug-Sub", sub);
                }
            }

            if let Some(sessions) = &self.sessions {
                let session = sessions.ensure_session().await?;
                req = req
                    .header("Session-Id", session.id.to_string())
                    .header("Epoch", session.epoch.to_string());
            }

            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req.send().await?;
            let status = resp.status();

            tracing::debug!(
                method = %method,
                path,
                status = status.as_u16(),
                attempt,
                correlation_id = %correlation_id,
                "request completed"
            );

            if status.is_success() {
                return Ok(resp);
            }

            match status {
                StatusCode::UNAUTHORIZED => {
                    // 失效 token 缓存重试一次；再 401 即失败
                    match &self.auth {
                        ClientAuth::Bearer(provider)
                            if !token_refreshed && attempt < MAX_ATTEMPTS =>
                        {
                            tracing::warn!("401 unauthorized, invalidating token and retrying");
                            provider.invalidate();
                            token_refreshed = true;
                        }
                        _ => return Err(ClientError::AuthFailed),
                    }
                }
                StatusCode::CONFLICT => {
                    let server_epoch_header = resp
                        .headers()
                        .get("epoch")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<i64>().ok());

                    let bytes = resp.bytes().await.unwrap_or_default();
                    let payload: ErrorPayload = serde_json::from_slice(&bytes).unwrap_or_default();

                    if payload.error == "epoch_mismatch" {
                        let server_epoch =
                            server_epoch_header.or(payload.epoch).unwrap_or_default();
                        match &self.sessions {
                            Some(sessions) if attempt < MAX_ATTEMPTS => {
                                tracing::warn!(
                                    server_epoch,
                                    "epoch mismatch, refreshing session and retrying"
                                );
                                sessions.invalidate().await;
                            }
                            _ => return Err(ClientError::EpochMismatch { server_epoch }),
                        }
                    } else if let (Some(expected), Some(actual)) =
                        (payload.expected, payload.actual)
                    {
                        // 版本冲突不重试，原样交还调用方
                        return Err(ClientError::VersionMismatch { expected, actual });
                    } else {
                        return Err(ClientError::Api {
                            status: status.as_u16(),
                            message: payload.error,
                        });
                    }
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = parse_retry_after(
                        resp.headers()
                            .get(RETRY_AFTER)
                            .and_then(|v| v.to_str().ok()),
                    );
                    let delay = retry_after.unwrap_or_else(|| {
                        DEFAULT_BACKOFF * 2u32.saturating_pow(attempt - 1)
                    });

                    if attempt >= MAX_ATTEMPTS {
                        return Err(ClientError::RateLimited {
                            retry_after_secs: delay.as_secs(),
                        });
                    }

                    tracing::warn!(delay_ms = delay.as_millis() as u64, attempt, "rate limited, backing off");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                    }
                }
                _ => {
                    // 网络层之上的其它失败（含 5xx）由调用方决定是否重试
                    let message = resp.text().await.unwrap_or_default();
                    return Err(ClientError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
            }
        }
    }

    // ==================== 同步便捷方法 ====================

    pub async fn push(&self, kind: &str, items: &[Value]) -> Result<Vec<PushAck>, ClientError> {
        let body = json!({ "items": items });
        let resp = self
            .execute(Method::POST, &format!("/v1/sync/{kind}/push"), Some(&body))
            .await?;
        resp.json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    pub async fn pull(
        &self,
        kind: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<PullPage, ClientError> {
        let mut path = format!("/v1/sync/{kind}/pull");
        let mut sep = '?';
        if let Some(cursor) = cursor {
            path.push_str(&format!("{sep}cursor={cursor}"));
            sep = '&';
        }
        if let Some(limit) = limit {
            path.push_str(&format!("{sep}limit={limit}"));
        }

        let resp = self.execute(Method::GET, &path, None).await?;
        resp.json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// 解析 Retry-After：整数秒或 HTTP-date
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let value = value?;

    if let Ok(seconds) = value.parse::<i64>() {
        if seconds >= 0 {
            return Some(Duration::from_secs(seconds as u64));
        }
        return None;
    }

    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        let until = at.with_timezone(&Utc) - Utc::now();
        return Some(until.to_std().unwrap_or(Duration::ZERO));
    }

    None
}
