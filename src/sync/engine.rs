// src/sync/engine.rs

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{EntityKind, PullPage, PushAck, SyncItem};
use crate::storage::{Database, EntityStore};
use crate::utils::rfc3339_ms;

use super::cursor::Cursor;
use super::extract::{extract_header, extract_parent};

pub const DEFAULT_PULL_LIMIT: i64 = 500;
pub const MAX_PULL_LIMIT: i64 = 1000;

/// 拉取条数归一化：非正数回退默认值，超过上限截断
pub fn normalize_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n.min(MAX_PULL_LIMIT),
        _ => DEFAULT_PULL_LIMIT,
    }
}

/// 同步分发器：每种实体的推送批次与增量拉取。
///
/// 推送整批共用一个事务；单条失败写进该条 ack 的 error 继续处理，
/// 事务打开或提交失败则整批作废，不返回任何部分 ack。
#[derive(Clone)]
pub struct SyncEngine {
    db: Database,
    store: EntityStore,
}

impl SyncEngine {
    pub fn new(db: Database, store: EntityStore) -> Self {
        Self { db, store }
    }

    pub async fn push(
        &self,
        owner_id: &str,
        kind: EntityKind,
        items: &[Value],
    ) -> AppResult<Vec<PushAck>> {
        tracing::info!(
            user_id = %owner_id,
            entity = kind.table(),
            item_count = items.len(),
            "sync_push_started"
        );

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::BatchFatal(format!("transaction error: {e}")))?;

        let mut acks = Vec::with_capacity(items.len());

        for item in items {
            let header = match extract_header(item) {
                Ok(header) => header,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to extract sync metadata");
                    acks.push(PushAck::invalid(e));
                    continue;
                }
            };

            let parent = match extract_parent(kind, item) {
                Ok(parent) => parent,
                Err(e) => {
                    acks.push(PushAck {
                        uid: header.uid.to_string(),
                        version: header.version,
                        updated_at: Some(rfc3339_ms(header.updated_at_ms)),
                        error: Some(e),
                    });
                    continue;
                }
            };

            let sync_item = SyncItem {
                uid: header.uid,
                updated_at_ms: header.updated_at_ms,
                deleted_at_ms: header.deleted_at_ms,
                version: header.version,
                parent,
                payload: item.clone(),
            };

            // 墓碑跳过父校验：父实体已删除时子墓碑仍要能落库
            if sync_item.deleted_at_ms.is_none() {
                match self
                    .store
                    .check_parent(&mut tx, owner_id, &sync_item.parent)
                    .await
                {
                    Ok(None) => {}
                    Ok(Some(reason)) => {
                        tracing::warn!(uid = %sync_item.uid, reason, "parent not found");
                        acks.push(PushAck::rejected(&sync_item, reason));
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(uid = %sync_item.uid, error = %e, "failed to validate parent");
                        acks.push(PushAck::rejected(&sync_item, "failed to validate parent"));
                        continue;
                    }
                }
            }

            match self.store.upsert(&mut tx, owner_id, kind, &sync_item).await {
                Ok((version, updated_at_ms)) => {
                    acks.push(PushAck::ok(sync_item.uid, version, updated_at_ms));
                }
                Err(e) => {
                    tracing::error!(uid = %sync_item.uid, error = %e, "failed to upsert item");
                    acks.push(PushAck::rejected(&sync_item, e.to_string()));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::BatchFatal(format!("commit failed: {e}")))?;

        tracing::info!(
            user_id = %owner_id,
            entity = kind.table(),
            success_count = acks.iter().filter(|a| a.error.is_none()).count(),
            "sync_push_completed"
        );

        Ok(acks)
    }

    pub async fn pull(
        &self,
        owner_id: &str,
        kind: EntityKind,
        cursor: Cursor,
        limit: i64,
    ) -> AppResult<PullPage> {
        let rows = self.store.scan(owner_id, kind, cursor, limit).await?;

        let mut upserts = Vec::with_capacity(rows.len());
        let mut deletes = Vec::new();
        let mut last: Option<Cursor> = None;

        for row in rows {
            let uid = Uuid::parse_str(&row.uid).unwrap_or(Uuid::nil());
            match row.deleted_at_ms {
                // 墓碑：只下发 uid 和删除时间
                Some(deleted_at_ms) => deletes.push(json!({
                    "uid": row.uid,
                    "deletedAt": rfc3339_ms(deleted_at_ms),
                })),
                None => upserts.push(row.payload),
            }
            last = Some(Cursor::new(row.updated_at_ms, uid));
        }

        let next_cursor = last.map(|c| c.encode());

        tracing::info!(
            user_id = %owner_id,
            entity = kind.table(),
            upsert_count = upserts.len(),
            delete_count = deletes.len(),
            has_next_page = next_cursor.is_some(),
            "sync_pull_completed"
        );

        Ok(PullPage {
            upserts,
            deletes,
            next_cursor,
        })
    }
}
