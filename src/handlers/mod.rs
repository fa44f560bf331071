// src/handlers/mod.rs

pub mod account;
pub mod health;
pub mod rest;
pub mod sessions;
pub mod sync;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{auth_middleware, AuthState, JwtService};
use crate::config::Config;
use crate::error::AppResult;
use crate::middleware::{correlation_middleware, sync_guard};
use crate::storage::{Database, EntityStore};
use crate::sync::{EpochController, SessionRegistry, SyncEngine};

/// 应用状态：所有 handler 共享
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub store: EntityStore,
    pub engine: SyncEngine,
    pub sessions: Arc<SessionRegistry>,
    pub epochs: EpochController,
}

impl AppState {
    /// 连接数据库、跑迁移并装配各组件
    pub async fn initialize(config: Arc<Config>) -> AppResult<Self> {
        let db = Database::new(&config.database).await?;
        db.run_migrations().await?;

        let store = EntityStore::new(db.clone());
        let engine = SyncEngine::new(db.clone(), store.clone());
        let sessions = Arc::new(SessionRegistry::new(config.sync.session_ttl_minutes));
        let epochs = EpochController::new(db.clone(), store.clone(), sessions.clone());

        Ok(Self {
            config,
            db,
            store,
            engine,
            sessions,
            epochs,
        })
    }
}

/// 构建完整路由
pub fn router(state: AppState) -> Router {
    let auth_state = AuthState {
        jwt_service: Arc::new(JwtService::new(&state.config.auth)),
        dev_mode: state.config.auth.dev_mode,
    };

    let api = Router::new()
        // 会话生命周期
        .route("/sync/sessions", post(sessions::begin_session))
        .route(
            "/sync/sessions/:id",
            get(sessions::get_session).delete(sessions::end_session),
        )
        // 同步状态与管理
        .route("/sync/info", get(account::server_info))
        .route("/sync/state", get(account::sync_state))
        .route("/account/wipe", post(account::wipe_account))
        // 按实体种类的推拉
        .route("/sync/:kind/push", post(sync::push))
        .route("/sync/:kind/pull", get(sync::pull))
        // 单条 REST 变更
        .route("/:kind", get(rest::list_entities).post(rest::create_entity))
        .route(
            "/:kind/:uid",
            get(rest::get_entity)
                .patch(rest::update_entity)
                .delete(rest::delete_entity),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            sync_guard,
        ))
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ));

    Router::new()
        // 健康检查（无需认证）
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .nest("/v1", api)
        .with_state(state)
        .layer(axum_middleware::from_fn(correlation_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
