//! Wiring: configuration to backends to services

use std::sync::Arc;

use anyhow::Context;
use msgsvc_core::memory::{InMemoryCounter, InMemoryMessageStore, InMemorySortedSetCache};
use msgsvc_core::repositories::{CacheBackend, CounterBackend, EventPublisher, MessageStore};
use msgsvc_core::services::{
    BroadcastEventBus, CacheOptions, CommandDispatcher, HistoryOptions, HistoryService,
    IngestionPipeline, MessageModeration, PartitionTeardown, RecencyCache, SequenceAuthority,
};
use msgsvc_infrastructure::{
    create_pool, create_redis_pool, PgMessageStore, RedisCounter, RedisSortedSetCache,
};
use msgsvc_security::ContentCipher;
use msgsvc_shared::{AppConfig, StorageMode};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Backends {
    pub store: Arc<dyn MessageStore>,
    pub counter: Arc<dyn CounterBackend>,
    pub cache: Arc<dyn CacheBackend>,
}

impl Backends {
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryMessageStore::new()),
            counter: Arc::new(InMemoryCounter::new()),
            cache: Arc::new(InMemorySortedSetCache::new()),
        }
    }
}

pub async fn connect_backends(config: &AppConfig) -> anyhow::Result<Backends> {
    match config.app.storage {
        StorageMode::Memory => {
            warn!("Using in-memory storage, nothing survives a restart");
            Ok(Backends::in_memory())
        }
        StorageMode::Postgres => {
            info!("Connecting to database...");
            let pool = create_pool(&config.database)
                .await
                .context("connecting to PostgreSQL")?;
            let store = PgMessageStore::init(pool, config.registry.max_partitions)
                .await
                .context("preparing message store")?;
            info!("Database connection established.");

            let redis = create_redis_pool(&config.redis).context("creating Redis pool")?;
            info!("Redis pool created.");

            Ok(Backends {
                store: Arc::new(store),
                counter: Arc::new(RedisCounter::new(redis.clone())),
                cache: Arc::new(RedisSortedSetCache::new(redis)),
            })
        }
    }
}

pub fn build_dispatcher(
    config: &AppConfig,
    backends: Backends,
    bus: Arc<BroadcastEventBus>,
) -> anyhow::Result<CommandDispatcher> {
    let cipher = Arc::new(
        ContentCipher::from_hex(&config.crypto.encryption_key).context("loading encryption key")?,
    );
    let timeout = config.backend.timeout();

    let cache = RecencyCache::new(
        backends.cache,
        CacheOptions {
            max_size: config.cache.max_size,
            ttl: config.cache.ttl(),
            timeout,
        },
    );
    let sequences = SequenceAuthority::new(backends.counter, timeout);
    let publisher: Arc<dyn EventPublisher> = bus;

    let ingestion = IngestionPipeline::new(
        sequences.clone(),
        cipher.clone(),
        backends.store.clone(),
        cache.clone(),
        publisher.clone(),
        timeout,
    );
    let history = HistoryService::new(
        cache.clone(),
        backends.store.clone(),
        cipher,
        sequences.gate().clone(),
        HistoryOptions {
            default_limit: config.history.default_limit,
            max_limit: config.history.max_limit,
            timeout,
        },
    );
    let moderation = MessageModeration::new(backends.store.clone(), cache.clone(), timeout);
    let teardown = PartitionTeardown::new(backends.store, cache, sequences, timeout);

    Ok(CommandDispatcher::new(
        Arc::new(ingestion),
        Arc::new(history),
        Arc::new(moderation),
        Arc::new(teardown),
        publisher,
        timeout,
    ))
}

/// Log every outbound record until the bus closes.
pub fn spawn_event_logger(bus: &BroadcastEventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => info!(
                    topic = %record.topic,
                    key = ?record.key,
                    "Outbound event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, {} event(s) skipped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
