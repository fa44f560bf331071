// tests/common/mod.rs
//
// 集成测试辅助：临时文件数据库 + 完整路由，开发模式下用 Debug-Sub
// 头扮演任意用户。

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use notesync_server::{router, AppState, Config};

pub struct TestApp {
    pub state: AppState,
    pub app: axum::Router,
    _temp_dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let mut config = Config::default();
    config.database.url = format!("sqlite://{}?mode=rwc", db_path.display());
    config.auth.dev_mode = true;

    let state = AppState::initialize(Arc::new(config)).await.unwrap();
    let app = router(state.clone());

    TestApp {
        state,
        app,
        _temp_dir: temp_dir,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user: &str,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("debug-sub", user);
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }

        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&value).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn push(&self, user: &str, kind: &str, items: Vec<Value>) -> TestResponse {
        self.request(
            "POST",
            &format!("/v1/sync/{kind}/push"),
            user,
            Some(json!({ "items": items })),
            &[],
        )
        .await
    }

    pub async fn pull(
        &self,
        user: &str,
        kind: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> TestResponse {
        let mut uri = format!("/v1/sync/{kind}/pull");
        let mut sep = '?';
        if let Some(cursor) = cursor {
            uri.push_str(&format!("{sep}cursor={cursor}"));
            sep = '&';
        }
        if let Some(limit) = limit {
            uri.push_str(&format!("{sep}limit={limit}"));
        }
        self.request("GET", &uri, user, None, &[]).await
    }

    pub async fn begin_session(&self, user: &str) -> TestResponse {
        self.request("POST", "/v1/sync/sessions", user, None, &[])
            .await
    }
}

pub fn note_payload(uid: Uuid, ms: i64, title: &str) -> Value {
    json!({
        "uid": uid.to_string(),
        "sync": {"updatedAtMs": ms, "version": 1},
        "title": title,
    })
}

pub fn tombstone_payload(uid: Uuid, ms: i64) -> Value {
    json!({
        "uid": uid.to_string(),
        "sync": {"updatedAtMs": ms, "version": 1, "deletedAtMs": ms},
    })
}

pub fn chat_message_payload(uid: Uuid, chat_uid: Uuid, ms: i64, text: &str) -> Value {
    json!({
        "uid": uid.to_string(),
        "chatUid": chat_uid.to_string(),
        "sync": {"updatedAtMs": ms, "version": 1},
        "text": text,
    })
}

pub fn comment_payload(uid: Uuid, parent_type: &str, parent_uid: Uuid, ms: i64) -> Value {
    json!({
        "uid": uid.to_string(),
        "parentType": parent_type,
        "parentUid": parent_uid.to_string(),
        "sync": {"updatedAtMs": ms, "version": 1},
        "body": "a comment",
    })
}
