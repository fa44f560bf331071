// src/sync/extract.rs

use serde_json::Value;
use uuid::Uuid;

use crate::models::{EntityKind, ParentRef, ParentSpec, ParentType, SyncItem};

/// 从不透明 payload 中提取同步头部。payload 本身原样存储，这里只抬出
/// 索引列需要的字段：uid、sync.updatedAtMs、sync.deletedAtMs、sync.version
/// 以及子实体的父引用。
///
/// Wire shape: `{uid, sync: {updatedAtMs, version, deletedAtMs?}, ...domain}`,
/// child kinds additionally carry top-level `chatUid` or
/// `parentType` + `parentUid`.
pub fn extract(kind: EntityKind, item: &Value) -> Result<SyncItem, String> {
    let header = extract_header(item)?;
    let parent = extract_parent(kind, item)?;

    Ok(SyncItem {
        uid: header.uid,
        updated_at_ms: header.updated_at_ms,
        deleted_at_ms: header.deleted_at_ms,
        version: header.version,
        parent,
        payload: item.clone(),
    })
}

pub struct Header {
    pub uid: Uuid,
    pub updated_at_ms: i64,
    pub deleted_at_ms: Option<i64>,
    pub version: i64,
}

/// 提取公共头部字段；uid 与 sync.updatedAtMs 为必填
pub fn extract_header(item: &Value) -> Result<Header, String> {
    let uid = require_uuid(item.get("uid"), "uid")?;

    let sync = item
        .get("sync")
        .and_then(Value::as_object)
        .ok_or_else(|| "invalid payload: missing sync block".to_string())?;

    let updated_at_ms = sync
        .get("updatedAtMs")
        .and_then(as_ms)
        .ok_or_else(|| "invalid payload: missing sync.updatedAtMs".to_string())?;

    let deleted_at_ms = sync.get("deletedAtMs").and_then(as_ms);

    // 客户端版本只作为首次插入的种子，钳位到 ≥ 1
    let version = sync
        .get("version")
        .and_then(Value::as_i64)
        .unwrap_or(1)
        .max(1);

    Ok(Header {
        uid,
        updated_at_ms,
        deleted_at_ms,
        version,
    })
}

/// 提取并校验父引用字段。顶层实体恒为 `ParentRef::None`。
pub fn extract_parent(kind: EntityKind, item: &Value) -> Result<ParentRef, String> {
    match kind.parent_spec() {
        ParentSpec::None => Ok(ParentRef::None),
        ParentSpec::Chat => {
            let chat_uid = require_uuid(item.get("chatUid"), "chatUid")?;
            Ok(ParentRef::Chat(chat_uid))
        }
        ParentSpec::NoteOrTask => {
            let raw = item
                .get("parentType")
                .and_then(Value::as_str)
                .ok_or_else(|| "invalid payload: missing parentType".to_string())?;
            let parent_type = match raw {
                "note" => ParentType::Note,
                "task" => ParentType::Task,
                other => {
                    return Err(format!(
                        "invalid parent_type: {other} (must be 'note' or 'task')"
                    ))
                }
            };
            let parent_uid = require_uuid(item.get("parentUid"), "parentUid")?;
            Ok(ParentRef::Poly {
                parent_type,
                parent_uid,
            })
        }
    }
}

fn require_uuid(value: Option<&Value>, field: &str) -> Result<Uuid, String> {
    let raw = value
        .and_then(Value::as_str)
        .ok_or_else(|| format!("invalid payload: missing {field}"))?;
    Uuid::parse_str(raw).map_err(|_| format!("invalid payload: malformed {field}"))
}

// 宽容处理 JSON 数字：整数优先，有限浮点截断
fn as_ms(value: &Value) -> Option<i64> {
    if let Some(ms) = value.as_i64() {
        return Some(ms);
    }
    value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)
}
