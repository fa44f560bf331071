// src/models/entity.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::utils::rfc3339_ms;

/// 实体种类描述符。七种实体共享同一张表结构和同一套同步逻辑，
/// 差别仅在表名、路由段和父引用策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Note,
    Task,
    TaskList,
    TaskListCategory,
    Chat,
    ChatMessage,
    Comment,
}

/// 父引用校验策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentSpec {
    /// 顶层实体，无父引用
    None,
    /// chat_message → chat
    Chat,
    /// comment → note 或 task
    NoteOrTask,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Note,
        EntityKind::Task,
        EntityKind::TaskList,
        EntityKind::TaskListCategory,
        EntityKind::Chat,
        EntityKind::ChatMessage,
        EntityKind::Comment,
    ];

    /// Wipe deletes child tables before parents so no pass observes a child
    /// row whose parent is already gone.
    pub const WIPE_ORDER: [EntityKind; 7] = [
        EntityKind::ChatMessage,
        EntityKind::Comment,
        EntityKind::Chat,
        EntityKind::Task,
        EntityKind::Note,
        EntityKind::TaskList,
        EntityKind::TaskListCategory,
    ];

    /// 数据库表名
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Note => "note",
            EntityKind::Task => "task",
            EntityKind::TaskList => "task_list",
            EntityKind::TaskListCategory => "task_list_category",
            EntityKind::Chat => "chat",
            EntityKind::ChatMessage => "chat_message",
            EntityKind::Comment => "comment",
        }
    }

    /// URL 路由段（复数）
    pub fn route(&self) -> &'static str {
        match self {
            EntityKind::Note => "notes",
            EntityKind::Task => "tasks",
            EntityKind::TaskList => "task_lists",
            EntityKind::TaskListCategory => "task_list_categories",
            EntityKind::Chat => "chats",
            EntityKind::ChatMessage => "chat_messages",
            EntityKind::Comment => "comments",
        }
    }

    pub fn from_route(segment: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.route() == segment)
    }

    pub fn parent_spec(&self) -> ParentSpec {
        match self {
            EntityKind::ChatMessage => ParentSpec::Chat,
            EntityKind::Comment => ParentSpec::NoteOrTask,
            _ => ParentSpec::None,
        }
    }
}

/// comment 的多态父类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentType {
    Note,
    Task,
}

impl ParentType {
    pub fn table(&self) -> &'static str {
        match self {
            ParentType::Note => "note",
            ParentType::Task => "task",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.table()
    }
}

/// 从 payload 中提取出的父引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    None,
    Chat(Uuid),
    Poly { parent_type: ParentType, parent_uid: Uuid },
}

/// 一条待写入的同步项：提取出的结构化头部 + 原样保留的 payload
#[derive(Debug, Clone)]
pub struct SyncItem {
    pub uid: Uuid,
    pub updated_at_ms: i64,
    pub deleted_at_ms: Option<i64>,
    /// 客户端建议版本，已钳位到 ≥ 1；仅用于首次插入的种子值
    pub version: i64,
    pub parent: ParentRef,
    pub payload: Value,
}

/// 存储层读出的实体行
#[derive(Debug, Clone)]
pub struct EntityRow {
    pub uid: String,
    pub updated_at_ms: i64,
    pub deleted_at_ms: Option<i64>,
    pub version: i64,
    pub payload: Value,
}

/// 单条推送的服务端权威回执
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAck {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushAck {
    pub fn ok(uid: Uuid, version: i64, updated_at_ms: i64) -> Self {
        Self {
            uid: uid.to_string(),
            version,
            updated_at: Some(rfc3339_ms(updated_at_ms)),
            error: None,
        }
    }

    pub fn rejected(item: &SyncItem, error: impl Into<String>) -> Self {
        Self {
            uid: item.uid.to_string(),
            version: item.version,
            updated_at: Some(rfc3339_ms(item.updated_at_ms)),
            error: Some(error.into()),
        }
    }

    /// 提取失败时连 uid 都不可用
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            uid: String::new(),
            version: 0,
            updated_at: None,
            error: Some(error.into()),
        }
    }
}

/// 一页增量拉取结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullPage {
    pub upserts: Vec<Value>,
    pub deletes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// REST 视图下的单个实体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestItem {
    pub uid: String,
    pub version: i64,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    pub payload: Value,
}

impl From<EntityRow> for RestItem {
    fn from(row: EntityRow) -> Self {
        Self {
            uid: row.uid,
            version: row.version,
            updated_at: rfc3339_ms(row.updated_at_ms),
            deleted_at: row.deleted_at_ms.map(rfc3339_ms),
            payload: row.payload,
        }
    }
}

/// REST 列表分页响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestPage {
    pub items: Vec<RestItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_route(kind.route()), Some(kind));
        }
        assert_eq!(EntityKind::from_route("widgets"), None);
    }

    #[test]
    fn test_wipe_order_children_first() {
        let order = EntityKind::WIPE_ORDER;
        let pos = |k: EntityKind| order.iter().position(|x| *x == k).unwrap();
        assert!(pos(EntityKind::ChatMessage) < pos(EntityKind::Chat));
        assert!(pos(EntityKind::Comment) < pos(EntityKind::Note));
        assert!(pos(EntityKind::Comment) < pos(EntityKind::Task));
        assert_eq!(order.len(), EntityKind::ALL.len());
    }
}
