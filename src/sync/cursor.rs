// src/sync/cursor.rs

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64_URL;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resume point for incremental pulls: the `(updated_at_ms, uid)` pair of the
/// last row the client has seen. Encoded form is opaque to clients; anything
/// the decoder cannot understand silently resets to the origin, which makes a
/// corrupted cursor a full re-sync rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub ms: i64,
    pub uid: Uuid,
}

impl Cursor {
    pub const ORIGIN: Cursor = Cursor {
        ms: 0,
        uid: Uuid::nil(),
    };

    pub fn new(ms: i64, uid: Uuid) -> Self {
        Self { ms, uid }
    }

    /// 编码为 URL 安全的不透明字符串
    pub fn encode(&self) -> String {
        // serde_json 序列化 (ms, uid) 结构不会失败
        let json = serde_json::to_vec(self).unwrap_or_default();
        B64_URL.encode(json)
    }

    /// 解码游标；空串或任何畸形输入都回退到原点
    pub fn decode(text: &str) -> Cursor {
        if text.is_empty() {
            return Cursor::ORIGIN;
        }
        let Ok(raw) = B64_URL.decode(text) else {
            return Cursor::ORIGIN;
        };
        serde_json::from_slice(&raw).unwrap_or(Cursor::ORIGIN)
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::ORIGIN
    }
}
