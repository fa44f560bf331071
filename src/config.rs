// src/config.rs

use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_hours: i64,
    /// 开发模式：允许 Debug-Sub 头替代 Bearer token
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// 同步会话 TTL（分钟）
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: i64,
}

// 默认值函数
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8081
}
fn default_db_url() -> String {
    "sqlite://notesync.db?mode=rwc".to_string()
}
fn default_max_connections() -> u32 {
    10
}
fn default_jwt_secret() -> String {
    "change-this-secret-in-production".to_string()
}
fn default_jwt_expiry() -> i64 {
    24
}
fn default_session_ttl() -> i64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_expiry_hours: default_jwt_expiry(),
            dev_mode: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: default_session_ttl(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> AppResult<Arc<Self>> {
        // 加载 .env 文件
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("NOTESYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        let cfg: Config = config
            .try_deserialize()
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        Ok(Arc::new(cfg))
    }
}
