//! Redis connection pool

use deadpool_redis::{Config, CreatePoolError, Pool, PoolConfig, Runtime};
use msgsvc_core::error::{Backend, ChatError};
use msgsvc_shared::config::RedisSettings;
use tracing::error;

pub fn create_redis_pool(settings: &RedisSettings) -> Result<Pool, CreatePoolError> {
    let mut cfg = Config::from_url(settings.url.clone());
    cfg.pool = Some(PoolConfig::new(settings.max_connections));
    cfg.create_pool(Some(Runtime::Tokio1))
}

pub(crate) async fn connection(
    pool: &Pool,
    backend: Backend,
) -> Result<deadpool_redis::Connection, ChatError> {
    pool.get().await.map_err(|e| {
        error!("Redis pool error ({}): {}", backend, e);
        ChatError::backend(backend, e.to_string())
    })
}

pub(crate) fn redis_error(backend: Backend, action: &str, e: deadpool_redis::redis::RedisError) -> ChatError {
    error!("Redis error {} ({}): {}", action, backend, e);
    ChatError::backend(backend, e.to_string())
}
