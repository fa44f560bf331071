// src/models/owner.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-owner sync generation state. `epoch` starts at 1 and only moves
/// forward; a bump invalidates every client replica of this owner's data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerState {
    pub epoch: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_wipe_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_wipe_by: Option<String>,
}

impl Default for OwnerState {
    fn default() -> Self {
        Self {
            epoch: 1,
            last_wipe_at: None,
            last_wipe_by: None,
        }
    }
}

/// 账户擦除结果：新 epoch + 每张表的删除行数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WipeResult {
    pub epoch: i64,
    pub deleted: BTreeMap<String, i64>,
}
