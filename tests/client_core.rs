// tests/client_core.rs
//
// 客户端传输核心的端到端验证：对真实服务端（随机端口）和桩路由
// 分别演练重试路径。

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use reqwest::Method;
use serde_json::json;
use uuid::Uuid;

use notesync_server::auth::JwtService;
use notesync_server::client::{
    ClientAuth, ClientError, HttpClient, SessionManager, TokenProvider,
};
use notesync_server::Config;

use common::{note_payload, spawn_app};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn push_and_pull_through_client() {
    let app = spawn_app().await;
    let base_url = serve(app.app.clone()).await;

    let client = HttpClient::new(&base_url, ClientAuth::DebugSub("u1".to_string()));
    let uid = Uuid::new_v4();

    let acks = client
        .push("notes", &[note_payload(uid, 1000, "from client")])
        .await
        .unwrap();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].uid, uid.to_string());
    assert_eq!(acks[0].version, 1);
    assert!(acks[0].error.is_none());

    let page = client.pull("notes", None, None).await.unwrap();
    assert_eq!(page.upserts.len(), 1);
    assert_eq!(page.upserts[0]["title"], "from client");
    assert!(page.next_cursor.is_some());
}

#[tokio::test]
async fn client_recovers_from_epoch_mismatch() {
    let app = spawn_app().await;
    let base_url = serve(app.app.clone()).await;

    let client = HttpClient::new(&base_url, ClientAuth::DebugSub("u1".to_string()));

    // 预热：建立会话（epoch 1）并成功推送一次
    client
        .push("notes", &[note_payload(Uuid::new_v4(), 1, "warmup")])
        .await
        .unwrap();

    // 服务端 wipe：epoch 变 2，老会话作废
    app.state.epochs.wipe("u1", "WIPE").await.unwrap();

    // 旧会话头触发 409 epoch_mismatch，客户端自动换新会话后成功
    let acks = client
        .push("notes", &[note_payload(Uuid::new_v4(), 2, "after wipe")])
        .await
        .unwrap();
    assert!(acks[0].error.is_none());

    let session = client
        .session_manager()
        .unwrap()
        .ensure_session()
        .await
        .unwrap();
    assert_eq!(session.epoch, 2);
}

struct RefreshingTokenProvider {
    tokens: Vec<String>,
    index: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for RefreshingTokenProvider {
    async fn token(&self) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = self.index.load(Ordering::SeqCst).min(self.tokens.len() - 1);
        Ok(self.tokens[index].clone())
    }

    fn invalidate(&self) {
        self.index.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn client_refreshes_token_once_on_401() {
    let app = spawn_app().await;
    let base_url = serve(app.app.clone()).await;

    // 与服务端共享密钥签出合法 token
    let valid = JwtService::new(&Config::default().auth)
        .generate_token("u1")
        .unwrap();
    let provider = Arc::new(RefreshingTokenProvider {
        tokens: vec!["garbage-token".to_string(), valid],
        index: AtomicUsize::new(0),
        calls: AtomicUsize::new(0),
    });

    let client =
        HttpClient::without_sessions(&base_url, ClientAuth::Bearer(provider.clone()));

    let resp = client
        .execute(Method::GET, "/v1/sync/state", None)
        .await
        .unwrap();
    let state: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(state["epoch"], 1);

    // 第一次 401 触发一次刷新，之后成功
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_fails_when_refresh_does_not_help() {
    let app = spawn_app().await;
    let base_url = serve(app.app.clone()).await;

    let provider = Arc::new(RefreshingTokenProvider {
        tokens: vec!["bad-1".to_string(), "bad-2".to_string()],
        index: AtomicUsize::new(0),
        calls: AtomicUsize::new(0),
    });

    let client =
        HttpClient::without_sessions(&base_url, ClientAuth::Bearer(provider.clone()));

    let err = client
        .execute(Method::GET, "/v1/sync/state", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AuthFailed));
    // 只刷新一次，不无限重试
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

fn rate_limited_stub(fail_count: usize, counter: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/v1/ping",
        get(move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < fail_count {
                    (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "0")], "slow down")
                        .into_response()
                } else {
                    (StatusCode::OK, "ok").into_response()
                }
            }
        }),
    )
}

#[tokio::test]
async fn client_retries_through_429() {
    let counter = Arc::new(AtomicUsize::new(0));
    let base_url = serve(rate_limited_stub(2, counter.clone())).await;

    let client =
        HttpClient::without_sessions(&base_url, ClientAuth::DebugSub("u1".to_string()));

    let resp = client.execute(Method::GET, "/v1/ping", None).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_gives_up_after_bounded_429_attempts() {
    let counter = Arc::new(AtomicUsize::new(0));
    let base_url = serve(rate_limited_stub(usize::MAX, counter.clone())).await;

    let client =
        HttpClient::without_sessions(&base_url, ClientAuth::DebugSub("u1".to_string()));

    let err = client.execute(Method::GET, "/v1/ping", None).await.unwrap_err();
    assert!(matches!(err, ClientError::RateLimited { .. }));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn backoff_wait_respects_cancellation() {
    // 无 Retry-After：退避 1s 起步，取消应立即打断等待
    let stub = Router::new().route(
        "/v1/ping",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response() }),
    );
    let base_url = serve(stub).await;

    let client = Arc::new(HttpClient::without_sessions(
        &base_url,
        ClientAuth::DebugSub("u1".to_string()),
    ));
    let cancel = client.cancel_handle();

    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(Method::GET, "/v1/ping", None).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .expect("cancellation should interrupt the backoff wait")
        .unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled)));
}

fn session_counting_stub(counter: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/v1/sync/sessions",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // 模拟真实会话响应
                let now = chrono::Utc::now();
                (
                    StatusCode::CREATED,
                    [("epoch", "1")],
                    axum::Json(json!({
                        "id": Uuid::new_v4().to_string(),
                        "userId": "u1",
                        "createdAt": now.to_rfc3339(),
                        "expiresAt": (now + chrono::Duration::minutes(30)).to_rfc3339(),
                        "epoch": 1,
                    })),
                )
            }
        }),
    )
}

#[tokio::test]
async fn concurrent_ensure_session_creates_exactly_one() {
    let counter = Arc::new(AtomicUsize::new(0));
    let base_url = serve(session_counting_stub(counter.clone())).await;

    let manager = Arc::new(SessionManager::new(
        base_url,
        ClientAuth::DebugSub("u1".to_string()),
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(
            async move { manager.ensure_session().await },
        ));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }

    // 冷缓存下并发调用坍缩成一次创建
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn version_conflict_is_returned_verbatim() {
    let stub = Router::new().route(
        "/v1/ping",
        get(|| async {
            (
                StatusCode::CONFLICT,
                axum::Json(json!({"error": "version mismatch", "expected": 3, "actual": 4})),
            )
        }),
    );
    let base_url = serve(stub).await;

    let client =
        HttpClient::without_sessions(&base_url, ClientAuth::DebugSub("u1".to_string()));

    let err = client.execute(Method::GET, "/v1/ping", None).await.unwrap_err();
    match err {
        ClientError::VersionMismatch { expected, actual } => {
            assert_eq!(expected, 3);
            assert_eq!(actual, 4);
        }
        other => panic!("expected version mismatch, got {other:?}"),
    }
}
