//! Message ingestion pipeline

use std::sync::Arc;
use std::time::Duration;

use msgsvc_security::ContentCipher;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::deadline::bounded;
use super::recency_cache::RecencyCache;
use super::router::ConversationRouter;
use super::sequence::SequenceAuthority;
use crate::domain::{now_millis, Message, NewMessageCommand, OutboundEvent, PersistedMessage};
use crate::error::{Backend, ChatError, IngestionStage};
use crate::repositories::{EventPublisher, MessageStore};

/// Routes, numbers, encrypts and persists one inbound message, then announces it.
///
/// Anything failing before the durable append loses the message. A consumed sequence
/// number that never reaches the store is left as a gap.
pub struct IngestionPipeline {
    router: ConversationRouter,
    sequences: SequenceAuthority,
    cipher: Arc<ContentCipher>,
    store: Arc<dyn MessageStore>,
    cache: RecencyCache,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        sequences: SequenceAuthority,
        cipher: Arc<ContentCipher>,
        store: Arc<dyn MessageStore>,
        cache: RecencyCache,
        publisher: Arc<dyn EventPublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            router: ConversationRouter::new(),
            sequences,
            cipher,
            store,
            cache,
            publisher,
            timeout,
        }
    }

    pub async fn ingest(&self, command: &NewMessageCommand) -> Result<PersistedMessage, ChatError> {
        // 1. Validate
        command
            .validate()
            .map_err(|e| ChatError::from(e).at_stage(IngestionStage::Validation))?;

        // 2. Route
        let ids = command.conversation_ids();
        let key = self
            .router
            .route(&command.chat_type, &ids)
            .map_err(|e| ChatError::from(e).at_stage(IngestionStage::Routing))?;

        // 3. Number; the lease keeps a teardown of this partition out until the cache write
        let lease = self
            .sequences
            .lease(&key)
            .await
            .map_err(|e| e.at_stage(IngestionStage::Sequencing))?;
        let sequence_number = lease.number;

        // 4. Encrypt
        let content = self
            .cipher
            .encrypt(&command.content)
            .map_err(|e| ChatError::from(e).at_stage(IngestionStage::Encryption))?;

        let message = Message {
            message_id: Uuid::new_v4(),
            partition_key: key.clone(),
            channel_id: ids.display_channel(),
            sender_id: command.sender_id.clone(),
            sequence_number,
            timestamp: now_millis(),
            content,
            attachments: command.attachments.clone(),
            mentions: command.mentions.iter().cloned().collect(),
            reply_to: command.reply_to,
            reactions: Default::default(),
            is_edited: false,
            deleted: false,
            deleted_by: None,
            deleted_at: None,
        };

        // 5. Persist
        bounded(Backend::Store, self.timeout, self.store.append(&key, &message))
            .await
            .map_err(|e| {
                error!("Failed to persist #{} in {}: {}", sequence_number, key, e);
                e.at_stage(IngestionStage::Persistence)
            })?;

        // 6. Cache, best effort. A window missing its newest message would keep serving
        // a stale first page, so a failed write drops the window instead.
        if let Err(e) = self.cache.put(&key, std::slice::from_ref(&message)).await {
            warn!("Failed to cache #{} in {}, evicting: {}", sequence_number, key, e);
            if let Err(e) = self.cache.evict(&key).await {
                error!("Cache window for {} may be stale until it expires: {}", key, e);
            }
        }
        drop(lease);

        // 7. Announce
        let persisted = PersistedMessage::new(&message, command.content.clone());
        bounded(
            Backend::Bus,
            self.timeout,
            self.publisher.publish(OutboundEvent::MessagePersisted(persisted.clone())),
        )
        .await
        .map_err(|e| e.at_stage(IngestionStage::Publish))?;

        info!("Message {} persisted in {} as #{}", message.message_id, key, sequence_number);
        debug!("Message {} sender={} attachments={}", message.message_id, message.sender_id, message.attachments.len());
        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConversationDescriptor, HistoryFilter, PartitionKey};
    use crate::memory::{InMemoryCounter, InMemoryMessageStore, InMemorySortedSetCache};
    use crate::repositories::{
        CacheBackend, MockCounterBackend, MockEventPublisher, MockMessageStore, ScoredValue,
    };
    use crate::services::event_bus::BroadcastEventBus;
    use crate::services::gate::PartitionGate;
    use crate::services::history::{HistoryOptions, HistoryService};
    use crate::services::recency_cache::CacheOptions;
    use std::sync::atomic::{AtomicBool, Ordering};

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const TIMEOUT: Duration = Duration::from_millis(500);

    fn cipher() -> Arc<ContentCipher> {
        Arc::new(ContentCipher::from_hex(KEY_HEX).unwrap())
    }

    fn memory_cache() -> RecencyCache {
        RecencyCache::new(Arc::new(InMemorySortedSetCache::new()), CacheOptions::default())
    }

    fn command(chat_type: &str, sender: &str, target: &str, content: &str) -> NewMessageCommand {
        NewMessageCommand {
            chat_type: chat_type.into(),
            target_id: Some(target.into()),
            server_id: None,
            channel_id: None,
            sender_id: sender.into(),
            content: content.into(),
            attachments: Vec::new(),
            mentions: vec!["u2".into(), "u2".into()],
            reply_to: None,
        }
    }

    struct Fixture {
        store: Arc<InMemoryMessageStore>,
        cache: RecencyCache,
        bus: Arc<BroadcastEventBus>,
        pipeline: IngestionPipeline,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMessageStore::new());
        let cache = memory_cache();
        let bus = Arc::new(BroadcastEventBus::new(64));
        let pipeline = IngestionPipeline::new(
            SequenceAuthority::new(Arc::new(InMemoryCounter::new()), TIMEOUT),
            cipher(),
            store.clone(),
            cache.clone(),
            bus.clone(),
            TIMEOUT,
        );
        Fixture {
            store,
            cache,
            bus,
            pipeline,
        }
    }

    fn private_key(a: &str, b: &str) -> PartitionKey {
        ConversationDescriptor::Private {
            participants: [a.into(), b.into()],
        }
        .partition_key()
    }

    #[tokio::test]
    async fn test_ingest_persists_encrypted_and_announces_plaintext() {
        let fx = fixture();
        let mut rx = fx.bus.subscribe();

        let persisted = fx
            .pipeline
            .ingest(&command("private", "bob", "alice", "hello"))
            .await
            .unwrap();
        assert_eq!(persisted.sequence_number, 1);
        assert_eq!(persisted.content, "hello");
        assert_eq!(persisted.mentions.len(), 1);

        let stored = fx
            .store
            .find(&private_key("alice", "bob"), &HistoryFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].content.ciphertext, hex::encode("hello"));
        assert_eq!(cipher().decrypt(&stored[0].content).unwrap(), "hello");

        let cached = fx
            .cache
            .range_before(&private_key("alice", "bob"), None, 10)
            .await
            .unwrap();
        assert_eq!(cached, stored);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.topic, "message.persisted");
        assert_eq!(record.payload["content"], "hello");
    }

    #[tokio::test]
    async fn test_both_directions_share_one_sequence() {
        let fx = fixture();
        let first = fx.pipeline.ingest(&command("private", "alice", "bob", "hi")).await.unwrap();
        let second = fx.pipeline.ingest(&command("private", "bob", "alice", "yo")).await.unwrap();
        assert_eq!((first.sequence_number, second.sequence_number), (1, 2));
    }

    #[tokio::test]
    async fn test_routing_failure_is_tagged() {
        let fx = fixture();
        let err = fx
            .pipeline
            .ingest(&command("broadcast", "alice", "bob", "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(IngestionStage::Routing));
    }

    #[tokio::test]
    async fn test_validation_failure_is_tagged() {
        let fx = fixture();
        let err = fx.pipeline.ingest(&command("group", "", "g1", "hi")).await.unwrap_err();
        assert_eq!(err.stage(), Some(IngestionStage::Validation));
    }

    #[tokio::test]
    async fn test_counter_outage_fails_closed() {
        let mut counter = MockCounterBackend::new();
        counter
            .expect_increment()
            .returning(|_| Err(ChatError::backend(Backend::Counter, "refused")));
        let mut store = MockMessageStore::new();
        store.expect_append().never();
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().never();

        let pipeline = IngestionPipeline::new(
            SequenceAuthority::new(Arc::new(counter), TIMEOUT),
            cipher(),
            Arc::new(store),
            memory_cache(),
            Arc::new(publisher),
            TIMEOUT,
        );

        let err = pipeline.ingest(&command("group", "u1", "g1", "hi")).await.unwrap_err();
        assert_eq!(err.stage(), Some(IngestionStage::Sequencing));
        match err {
            ChatError::Ingestion { source, .. } => {
                assert!(matches!(*source, ChatError::CounterUnavailable(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_not_announced() {
        let mut store = MockMessageStore::new();
        store
            .expect_append()
            .returning(|_, _| Err(ChatError::backend(Backend::Store, "disk full")));
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().never();

        let pipeline = IngestionPipeline::new(
            SequenceAuthority::new(Arc::new(InMemoryCounter::new()), TIMEOUT),
            cipher(),
            Arc::new(store),
            memory_cache(),
            Arc::new(publisher),
            TIMEOUT,
        );

        let err = pipeline.ingest(&command("group", "u1", "g1", "hi")).await.unwrap_err();
        assert_eq!(err.stage(), Some(IngestionStage::Persistence));
    }

    #[tokio::test]
    async fn test_failed_message_leaves_a_gap() {
        let mut store = MockMessageStore::new();
        let mut calls = 0;
        store.expect_append().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(ChatError::backend(Backend::Store, "blip"))
            } else {
                Ok(())
            }
        });
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().returning(|_| Ok(()));

        let pipeline = IngestionPipeline::new(
            SequenceAuthority::new(Arc::new(InMemoryCounter::new()), TIMEOUT),
            cipher(),
            Arc::new(store),
            memory_cache(),
            Arc::new(publisher),
            TIMEOUT,
        );

        assert!(pipeline.ingest(&command("group", "u1", "g1", "a")).await.is_err());
        let next = pipeline.ingest(&command("group", "u1", "g1", "b")).await.unwrap();
        assert_eq!(next.sequence_number, 2);
    }

    /// In-memory sorted set whose writes can be switched off.
    struct FlakyCache {
        inner: InMemorySortedSetCache,
        failing: AtomicBool,
    }

    #[async_trait::async_trait]
    impl CacheBackend for FlakyCache {
        async fn upsert(&self, key: &str, entries: &[ScoredValue]) -> Result<(), ChatError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ChatError::backend(Backend::Cache, "write refused"));
            }
            self.inner.upsert(key, entries).await
        }
        async fn range_by_score(
            &self,
            key: &str,
            max: Option<u64>,
            min: u64,
            limit: usize,
        ) -> Result<Vec<ScoredValue>, ChatError> {
            self.inner.range_by_score(key, max, min, limit).await
        }
        async fn trim_by_rank(&self, key: &str, start: i64, stop: i64) -> Result<(), ChatError> {
            self.inner.trim_by_rank(key, start, stop).await
        }
        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), ChatError> {
            self.inner.expire(key, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<(), ChatError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_cache_write_leaves_no_stale_first_page() {
        let backend = Arc::new(FlakyCache {
            inner: InMemorySortedSetCache::new(),
            failing: AtomicBool::new(false),
        });
        let cache = RecencyCache::new(backend.clone(), CacheOptions::default());
        let store = Arc::new(InMemoryMessageStore::new());
        let cipher = cipher();
        let pipeline = IngestionPipeline::new(
            SequenceAuthority::new(Arc::new(InMemoryCounter::new()), TIMEOUT),
            cipher.clone(),
            store.clone(),
            cache.clone(),
            Arc::new(BroadcastEventBus::new(8)),
            TIMEOUT,
        );
        let history = HistoryService::new(
            cache.clone(),
            store,
            cipher,
            PartitionGate::new(),
            HistoryOptions::default(),
        );

        for text in ["a", "b", "c"] {
            pipeline.ingest(&command("group", "u1", "g1", text)).await.unwrap();
        }
        backend.failing.store(true, Ordering::SeqCst);
        let latest = pipeline.ingest(&command("group", "u1", "g1", "d")).await.unwrap();
        assert_eq!(latest.sequence_number, 4);

        let key = ConversationDescriptor::Group { group_id: "g1".into() }.partition_key();
        assert!(cache.range_before(&key, None, 10).await.unwrap().is_empty());

        let page = history.fetch_page(&key, None, 20).await.unwrap();
        let seqs: Vec<u64> = page.messages.iter().map(|m| m.sequence_number).collect();
        assert_eq!(seqs, vec![4, 3, 2, 1]);
        assert_eq!(page.messages[0].content, "d");
    }

    #[tokio::test]
    async fn test_publish_failure_is_tagged_after_persisting() {
        let store = Arc::new(InMemoryMessageStore::new());
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .returning(|_| Err(ChatError::backend(Backend::Bus, "broker down")));

        let pipeline = IngestionPipeline::new(
            SequenceAuthority::new(Arc::new(InMemoryCounter::new()), TIMEOUT),
            cipher(),
            store.clone(),
            memory_cache(),
            Arc::new(publisher),
            TIMEOUT,
        );

        let err = pipeline.ingest(&command("group", "u1", "g1", "hi")).await.unwrap_err();
        assert_eq!(err.stage(), Some(IngestionStage::Publish));
        let key = ConversationDescriptor::Group { group_id: "g1".into() }.partition_key();
        assert_eq!(store.count(&key, &HistoryFilter::default()).await.unwrap(), 1);
    }
}
