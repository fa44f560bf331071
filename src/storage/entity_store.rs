// src/storage/entity_store.rs

use serde_json::Value;
use sqlx::sqlite::SqliteConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{EntityKind, EntityRow, ParentRef, SyncItem};
use crate::sync::cursor::Cursor;

use super::Database;

/// 通用实体存储。七种实体共用同一套 SQL，按 `EntityKind` 描述符选表名
/// 和父引用列。
#[derive(Clone)]
pub struct EntityStore {
    db: Database,
}

/// scan 读出的一行（引擎据此拆分 upsert / delete）
type ScanRow = (String, i64, Option<i64>, i64, String);

impl EntityStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ==================== 写路径（事务内） ====================

    /// LWW upsert。不存在则插入（版本种子 = max(client, 1)）；存在则仅当
    /// 新时间戳严格大于已存时间戳时覆盖并把版本 +1。
    ///
    /// 严格 `>` 而非 `>=`：同一时间戳的重复推送必须是幂等 no-op，
    /// 版本号不得变化。
    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        kind: EntityKind,
        item: &SyncItem,
    ) -> AppResult<(i64, i64)> {
        let table = kind.table();
        let payload = serde_json::to_string(&item.payload)?;

        match item.parent {
            ParentRef::None => {
                let sql = format!(
                    "INSERT INTO {table} (owner_id, uid, updated_at_ms, deleted_at_ms, version, payload) \
                     VALUES (?1, ?2, ?3, ?4, MAX(?5, 1), ?6) \
                     ON CONFLICT(owner_id, uid) DO UPDATE SET \
                         payload = excluded.payload, \
                         updated_at_ms = excluded.updated_at_ms, \
                         deleted_at_ms = excluded.deleted_at_ms, \
                         version = version + 1 \
                     WHERE excluded.updated_at_ms > {table}.updated_at_ms"
                );
                sqlx::query(&sql)
                    .bind(owner_id)
                    .bind(item.uid.to_string())
                    .bind(item.updated_at_ms)
                    .bind(item.deleted_at_ms)
                    .bind(item.version)
                    .bind(payload)
                    .execute(&mut *conn)
                    .await?;
            }
            ParentRef::Chat(chat_uid) => {
                let sql = format!(
                    "INSERT INTO {table} (owner_id, uid, updated_at_ms, deleted_at_ms, version, payload, chat_uid) \
                     VALUES (?1, ?2, ?3, ?4, MAX(?5, 1), ?6, ?7) \
                     ON CONFLICT(owner_id, uid) DO UPDATE SET \
                         payload = excluded.payload, \
                         updated_at_ms = excluded.updated_at_ms, \
                         deleted_at_ms = excluded.deleted_at_ms, \
                         chat_uid = excluded.chat_uid, \
                         version = version + 1 \
                     WHERE excluded.updated_at_ms > {table}.updated_at_ms"
                );
                sqlx::query(&sql)
                    .bind(owner_id)
                    .bind(item.uid.to_string())
                    .bind(item.updated_at_ms)
                    .bind(item.deleted_at_ms)
                    .bind(item.version)
                    .bind(payload)
                    .bind(chat_uid.to_string())
                    .execute(&mut *conn)
                    .await?;
            }
            ParentRef::Poly {
                parent_type,
                parent_uid,
            } => {
                let sql = format!(
                    "INSERT INTO {table} (owner_id, uid, updated_at_ms, deleted_at_ms, version, payload, parent_type, parent_uid) \
                     VALUES (?1, ?2, ?3, ?4, MAX(?5, 1), ?6, ?7, ?8) \
                     ON CONFLICT(owner_id, uid) DO UPDATE SET \
                         payload = excluded.payload, \
                         updated_at_ms = excluded.updated_at_ms, \
                         deleted_at_ms = excluded.deleted_at_ms, \
                         parent_type = excluded.parent_type, \
                         parent_uid = excluded.parent_uid, \
                         version = version + 1 \
                     WHERE excluded.updated_at_ms > {table}.updated_at_ms"
                );
                sqlx::query(&sql)
                    .bind(owner_id)
                    .bind(item.uid.to_string())
                    .bind(item.updated_at_ms)
                    .bind(item.deleted_at_ms)
                    .bind(item.version)
                    .bind(payload)
                    .bind(parent_type.as_str())
                    .bind(parent_uid.to_string())
                    .execute(&mut *conn)
                    .await?;
            }
        }

        self.read_back(conn, owner_id, kind, item.uid).await
    }

    /// 回读服务端权威 (version, updated_at_ms)，作为 ack 内容
    async fn read_back(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        kind: EntityKind,
        uid: Uuid,
    ) -> AppResult<(i64, i64)> {
        let sql = format!(
            "SELECT version, updated_at_ms FROM {} WHERE owner_id = ?1 AND uid = ?2",
            kind.table()
        );
        let row: (i64, i64) = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(uid.to_string())
            .fetch_one(&mut *conn)
            .await?;
        Ok(row)
    }

    /// 父引用校验（非墓碑写入前调用）。返回 Some(错误文案) 表示拒绝。
    ///
    /// 墓碑写入跳过此检查：父实体先被删除后，子实体的删除仍要能同步下来。
    pub async fn check_parent(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        parent: &ParentRef,
    ) -> AppResult<Option<String>> {
        let (table, label, uid) = match parent {
            ParentRef::None => return Ok(None),
            ParentRef::Chat(uid) => ("chat", "chat", *uid),
            ParentRef::Poly {
                parent_type,
                parent_uid,
            } => (parent_type.table(), parent_type.as_str(), *parent_uid),
        };

        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {table} \
             WHERE owner_id = ?1 AND uid = ?2 AND deleted_at_ms IS NULL)"
        );
        let exists: i64 = sqlx::query_scalar(&sql)
            .bind(owner_id)
            .bind(uid.to_string())
            .fetch_one(&mut *conn)
            .await?;

        if exists == 0 {
            return Ok(Some(format!("parent {label} not found: {uid}")));
        }
        Ok(None)
    }

    /// REST 层用：事务内探测当前 (updated_at_ms, version)
    pub async fn probe(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        kind: EntityKind,
        uid: Uuid,
    ) -> AppResult<Option<(i64, i64)>> {
        let sql = format!(
            "SELECT updated_at_ms, version FROM {} WHERE owner_id = ?1 AND uid = ?2",
            kind.table()
        );
        let row: Option<(i64, i64)> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(uid.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// REST 层用：upsert 之后把修正过的 payload 写回（sync.version 补丁）
    pub async fn update_payload(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        kind: EntityKind,
        uid: Uuid,
        payload: &Value,
    ) -> AppResult<()> {
        let sql = format!(
            "UPDATE {} SET payload = ?1 WHERE owner_id = ?2 AND uid = ?3",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(serde_json::to_string(payload)?)
            .bind(owner_id)
            .bind(uid.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// wipe 用：删除某 owner 在一张表里的全部行，返回行数
    pub async fn delete_all(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        kind: EntityKind,
    ) -> AppResult<i64> {
        let sql = format!("DELETE FROM {} WHERE owner_id = ?1", kind.table());
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() as i64)
    }

    // ==================== 读路径（无状态） ====================

    /// 游标扫描：按 (updated_at_ms, uid) 升序返回严格大于游标的行。
    /// 两次对同一静止状态、同一游标的扫描返回完全相同的页。
    pub async fn scan(
        &self,
        owner_id: &str,
        kind: EntityKind,
        cursor: Cursor,
        limit: i64,
    ) -> AppResult<Vec<EntityRow>> {
        let sql = format!(
            "SELECT uid, updated_at_ms, deleted_at_ms, version, payload \
             FROM {} \
             WHERE owner_id = ?1 AND (updated_at_ms, uid) > (?2, ?3) \
             ORDER BY updated_at_ms, uid \
             LIMIT ?4",
            kind.table()
        );
        let rows: Vec<ScanRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(cursor.ms)
            .bind(cursor.uid.to_string())
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter().map(Self::into_entity_row).collect()
    }

    /// 事务内单条读取（REST 变更路径在 LWW no-op 时用它取回现状）
    pub async fn get_by_uid_tx(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        kind: EntityKind,
        uid: Uuid,
    ) -> AppResult<Option<EntityRow>> {
        let sql = format!(
            "SELECT uid, updated_at_ms, deleted_at_ms, version, payload \
             FROM {} WHERE owner_id = ?1 AND uid = ?2",
            kind.table()
        );
        let row: Option<ScanRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(uid.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Self::into_entity_row).transpose()
    }

    /// REST 单条读取
    pub async fn get_by_uid(
        &self,
        owner_id: &str,
        kind: EntityKind,
        uid: Uuid,
    ) -> AppResult<Option<EntityRow>> {
        let sql = format!(
            "SELECT uid, updated_at_ms, deleted_at_ms, version, payload \
             FROM {} WHERE owner_id = ?1 AND uid = ?2",
            kind.table()
        );
        let row: Option<ScanRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(uid.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        row.map(Self::into_entity_row).transpose()
    }

    /// REST 列表：与 scan 同序，可选择过滤墓碑
    pub async fn list(
        &self,
        owner_id: &str,
        kind: EntityKind,
        cursor: Cursor,
        limit: i64,
        include_deleted: bool,
    ) -> AppResult<(Vec<EntityRow>, Option<Cursor>)> {
        let deleted_clause = if include_deleted {
            ""
        } else {
            "AND deleted_at_ms IS NULL "
        };
        let sql = format!(
            "SELECT uid, updated_at_ms, deleted_at_ms, version, payload \
             FROM {} \
             WHERE owner_id = ?1 AND (updated_at_ms, uid) > (?2, ?3) {}\
             ORDER BY updated_at_ms, uid \
             LIMIT ?4",
            kind.table(),
            deleted_clause
        );
        let raw: Vec<ScanRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(cursor.ms)
            .bind(cursor.uid.to_string())
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        let rows = raw
            .into_iter()
            .map(Self::into_entity_row)
            .collect::<AppResult<Vec<_>>>()?;

        let next = rows.last().map(|last| {
            Cursor::new(
                last.updated_at_ms,
                Uuid::parse_str(&last.uid).unwrap_or(Uuid::nil()),
            )
        });

        Ok((rows, next))
    }

    fn into_entity_row(row: ScanRow) -> AppResult<EntityRow> {
        let (uid, updated_at_ms, deleted_at_ms, version, payload) = row;
        Ok(EntityRow {
            uid,
            updated_at_ms,
            deleted_at_ms,
            version,
            payload: serde_json::from_str(&payload).map_err(AppError::SerializationError)?,
        })
    }
}
