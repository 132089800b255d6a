//! Configuration management

use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_EVENT_BUFFER, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_PARTITIONS, MAX_HISTORY_LIMIT,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
    pub history: HistorySettings,
    pub backend: BackendSettings,
    pub registry: RegistrySettings,
    pub crypto: CryptoSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub storage: StorageMode,
    pub event_buffer: usize,
}

/// Where messages, counters and the recency cache live.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// PostgreSQL store, Redis counter and cache.
    Postgres,
    /// Process memory only. Nothing survives a restart.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    /// Entries kept per partition window.
    pub max_size: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistorySettings {
    pub default_limit: u32,
    pub max_limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistrySettings {
    pub max_partitions: usize,
}

#[derive(Deserialize, Clone)]
pub struct CryptoSettings {
    /// Hex-encoded 256-bit content key.
    pub encryption_key: String,
}

impl std::fmt::Debug for CryptoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoSettings")
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Load from `.env`, `config/default`, `config/{APP_ENV}` and `__`-separated env vars.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Self::environment())
            .build()?;
        config.try_deserialize()
    }

    /// `SECTION__FIELD` variables. Values stay strings until deserialization, so a hex
    /// key made only of digits is not reinterpreted as a number.
    fn environment() -> Environment {
        Environment::default().separator("__")
    }

    /// Builder pre-populated with every default; callers add their own sources on top.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("app.env", "development")?
            .set_default("app.host", "127.0.0.1")?
            .set_default("app.port", 8080)?
            .set_default("app.name", "message-svc")?
            .set_default("app.storage", "postgres")?
            .set_default("app.event_buffer", DEFAULT_EVENT_BUFFER as u64)?
            .set_default("database.url", "postgres://localhost/messages")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_secs", 3)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.max_connections", 16)?
            .set_default("cache.max_size", DEFAULT_CACHE_MAX_SIZE as u64)?
            .set_default("cache.ttl_secs", DEFAULT_CACHE_TTL_SECS)?
            .set_default("history.default_limit", DEFAULT_HISTORY_LIMIT)?
            .set_default("history.max_limit", MAX_HISTORY_LIMIT)?
            .set_default("backend.timeout_ms", DEFAULT_BACKEND_TIMEOUT_MS)?
            .set_default("registry.max_partitions", DEFAULT_MAX_PARTITIONS as u64)
    }
}
