// src/sync/epoch.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::models::{EntityKind, OwnerState, WipeResult};
use crate::storage::{Database, EntityStore};

use super::session::SessionRegistry;

/// wipe 必须携带的确认口令
pub const WIPE_CONFIRMATION: &str = "WIPE";

/// 租户 epoch 控制器。每个 owner 一个单调递增的代数计数器，wipe 时
/// epoch 自增并清空该 owner 的全部数据；携带旧 epoch 的请求一律拒绝。
#[derive(Clone)]
pub struct EpochController {
    db: Database,
    store: EntityStore,
    sessions: Arc<SessionRegistry>,
}

impl EpochController {
    pub fn new(db: Database, store: EntityStore, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            db,
            store,
            sessions,
        }
    }

    /// 懒初始化 owner_state（epoch=1）并返回当前 epoch。
    /// 首次建会话时调用。
    pub async fn ensure_owner(&self, owner_id: &str) -> AppResult<i64> {
        sqlx::query(
            "INSERT INTO owner_state (owner_id) VALUES (?1) \
             ON CONFLICT(owner_id) DO NOTHING",
        )
        .bind(owner_id)
        .execute(self.db.pool())
        .await?;

        let epoch: i64 = sqlx::query_scalar("SELECT epoch FROM owner_state WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(epoch)
    }

    /// 当前 epoch；没有 owner_state 行时视为 1，不创建行
    pub async fn current(&self, owner_id: &str) -> AppResult<i64> {
        let epoch: Option<i64> =
            sqlx::query_scalar("SELECT epoch FROM owner_state WHERE owner_id = ?1")
                .bind(owner_id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(epoch.unwrap_or(1))
    }

    pub async fn state(&self, owner_id: &str) -> AppResult<OwnerState> {
        let row: Option<(i64, Option<DateTime<Utc>>, Option<String>)> = sqlx::query_as(
            "SELECT epoch, last_wipe_at, last_wipe_by FROM owner_state WHERE owner_id = ?1",
        )
        .bind(owner_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(match row {
            Some((epoch, last_wipe_at, last_wipe_by)) => OwnerState {
                epoch,
                last_wipe_at,
                last_wipe_by,
            },
            None => OwnerState::default(),
        })
    }

    /// 比对客户端声明的 epoch；不一致时带上服务端值拒绝
    pub async fn enforce(&self, owner_id: &str, client_epoch: i64) -> AppResult<()> {
        let server_epoch = self.current(owner_id).await?;
        if client_epoch != server_epoch {
            return Err(AppError::EpochMismatch {
                epoch: server_epoch,
            });
        }
        Ok(())
    }

    /// 账户擦除：单个事务内原子地 bump epoch 并删除该 owner 的全部实体行，
    /// 子表先于父表。提交后再失效该 owner 的所有会话。
    ///
    /// 部分 wipe 是被禁止的：epoch 与数据删除要么一起提交要么一起回滚。
    pub async fn wipe(&self, owner_id: &str, confirm: &str) -> AppResult<WipeResult> {
        if confirm != WIPE_CONFIRMATION {
            return Err(AppError::WipeNotConfirmed);
        }

        let mut tx = self.db.begin().await?;
        let now = Utc::now();

        let new_epoch: i64 = sqlx::query_scalar(
            "INSERT INTO owner_state (owner_id, epoch, last_wipe_at, last_wipe_by) \
             VALUES (?1, 2, ?2, ?1) \
             ON CONFLICT(owner_id) DO UPDATE SET \
                 epoch = owner_state.epoch + 1, \
                 last_wipe_at = excluded.last_wipe_at, \
                 last_wipe_by = excluded.last_wipe_by, \
                 updated_at = excluded.last_wipe_at \
             RETURNING epoch",
        )
        .bind(owner_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut deleted = BTreeMap::new();
        for kind in EntityKind::WIPE_ORDER {
            let count = self.store.delete_all(&mut tx, owner_id, kind).await?;
            deleted.insert(kind.table().to_string(), count);
        }

        tx.commit().await?;

        // 会话失效放在事务之外：注册表不参与数据库事务
        let sessions_deleted = self.sessions.delete_all(owner_id).await;

        tracing::info!(
            user_id = %owner_id,
            new_epoch,
            sessions_invalidated = sessions_deleted,
            ?deleted,
            "account wiped"
        );

        Ok(WipeResult {
            epoch: new_epoch,
            deleted,
        })
    }
}
