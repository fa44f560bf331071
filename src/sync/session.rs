// src/sync/session.rs

use std::collections::HashMap;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::SyncSession;

/// 会话注册表：进程内存中的 session_id → session 映射。
///
/// 会话随进程消失是协议允许的：客户端把"会话不存在"当作重新 Begin 的
/// 信号，不依赖会话在重启后存活。
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SyncSession>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// 创建新会话，并顺手清理已过期的条目
    pub async fn create(&self, user_id: &str, epoch: i64) -> SyncSession {
        let now = Utc::now();
        let session = SyncSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
            epoch,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(session.id, session.clone());

        session
    }

    /// 查询会话；过期条目视同不存在
    pub async fn get(&self, session_id: Uuid) -> Option<SyncSession> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&session_id)?;
        if session.is_expired(Utc::now()) {
            return None;
        }
        Some(session.clone())
    }

    pub async fn delete(&self, session_id: Uuid) -> bool {
        self.sessions.write().await.remove(&session_id).is_some()
    }

    /// 删除某 owner 的全部会话（wipe 之后调用），返回删除数量
    pub async fn delete_all(&self, user_id: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        before - sessions.len()
    }
}
