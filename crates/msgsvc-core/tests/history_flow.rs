//! Ingestion through history against the in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use msgsvc_core::memory::{InMemoryCounter, InMemoryMessageStore, InMemorySortedSetCache};
use msgsvc_core::services::{
    BroadcastEventBus, CacheOptions, HistoryOptions, HistoryService, IngestionPipeline,
    MessageModeration, PartitionTeardown, RecencyCache, SequenceAuthority,
};
use msgsvc_core::{HistoryRequest, NewMessageCommand};
use msgsvc_security::ContentCipher;

const KEY_HEX: &str = "4a6f686e20446f6520736179732068656c6c6f20746f2074686520776f726c64";
const TIMEOUT: Duration = Duration::from_secs(1);

struct Service {
    ingestion: IngestionPipeline,
    history: HistoryService,
    moderation: MessageModeration,
    teardown: PartitionTeardown,
    cache: RecencyCache,
}

fn service(cache_size: usize) -> Service {
    let cipher = Arc::new(ContentCipher::from_hex(KEY_HEX).unwrap());
    let store = Arc::new(InMemoryMessageStore::new());
    let cache = RecencyCache::new(
        Arc::new(InMemorySortedSetCache::new()),
        CacheOptions {
            max_size: cache_size,
            ttl: Duration::from_secs(60),
            timeout: TIMEOUT,
        },
    );
    let sequences = SequenceAuthority::new(Arc::new(InMemoryCounter::new()), TIMEOUT);

    Service {
        ingestion: IngestionPipeline::new(
            sequences.clone(),
            cipher.clone(),
            store.clone(),
            cache.clone(),
            Arc::new(BroadcastEventBus::new(16)),
            TIMEOUT,
        ),
        history: HistoryService::new(
            cache.clone(),
            store.clone(),
            cipher,
            sequences.gate().clone(),
            HistoryOptions::default(),
        ),
        moderation: MessageModeration::new(store.clone(), cache.clone(), TIMEOUT),
        teardown: PartitionTeardown::new(store, cache.clone(), sequences, TIMEOUT),
        cache,
    }
}

fn dm(from: &str, to: &str, content: &str) -> NewMessageCommand {
    NewMessageCommand {
        chat_type: "private".into(),
        target_id: Some(to.into()),
        server_id: None,
        channel_id: None,
        sender_id: from.into(),
        content: content.into(),
        attachments: Vec::new(),
        mentions: Vec::new(),
        reply_to: None,
    }
}

fn history(sender: &str, target: &str, before: Option<u64>, limit: u32) -> HistoryRequest {
    HistoryRequest {
        request_id: format!("{sender}-{before:?}"),
        chat_type: "private".into(),
        sender_id: sender.into(),
        target_id: Some(target.into()),
        server_id: None,
        channel_id: None,
        before,
        limit: Some(limit),
    }
}

#[tokio::test]
async fn test_paging_through_a_conversation_larger_than_the_cache() {
    let svc = service(10);
    for i in 1..=45 {
        let (from, to) = if i % 2 == 0 { ("ana", "ben") } else { ("ben", "ana") };
        svc.ingestion.ingest(&dm(from, to, &format!("line {i}"))).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut before = None;
    loop {
        let page = svc.history.handle(&history("ana", "ben", before, 20)).await.unwrap();
        seen.extend(page.messages.iter().map(|m| m.sequence_number));
        before = page.messages.last().map(|m| m.sequence_number);
        if !page.has_more {
            break;
        }
    }

    assert_eq!(seen, (1..=45).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_either_participant_reads_the_same_history() {
    let svc = service(100);
    svc.ingestion.ingest(&dm("ana", "ben", "hi ben")).await.unwrap();
    svc.ingestion.ingest(&dm("ben", "ana", "hi ana")).await.unwrap();

    let from_ana = svc.history.handle(&history("ana", "ben", None, 20)).await.unwrap();
    let from_ben = svc.history.handle(&history("ben", "ana", None, 20)).await.unwrap();

    let texts = |r: &msgsvc_core::HistoryResponse| -> Vec<String> {
        r.messages.iter().map(|m| m.content.clone()).collect()
    };
    assert_eq!(texts(&from_ana), vec!["hi ana", "hi ben"]);
    assert_eq!(texts(&from_ana), texts(&from_ben));
}

#[tokio::test]
async fn test_cold_cache_gives_the_same_answer() {
    let svc = service(100);
    for i in 1..=30 {
        svc.ingestion.ingest(&dm("ana", "ben", &format!("m{i}"))).await.unwrap();
    }
    let warm = svc.history.handle(&history("ana", "ben", Some(25), 10)).await.unwrap();

    let key = msgsvc_core::ConversationDescriptor::Private {
        participants: ["ana".into(), "ben".into()],
    }
    .partition_key();
    svc.cache.evict(&key).await.unwrap();

    let cold = svc.history.handle(&history("ana", "ben", Some(25), 10)).await.unwrap();
    assert_eq!(warm.messages, cold.messages);
    assert_eq!(warm.has_more, cold.has_more);
}

#[tokio::test]
async fn test_deleted_and_destroyed() {
    let svc = service(100);
    let mut ids = Vec::new();
    for i in 1..=5 {
        let persisted = svc.ingestion.ingest(&dm("ana", "ben", &format!("m{i}"))).await.unwrap();
        ids.push(persisted.message_id);
    }
    let key = msgsvc_core::ConversationDescriptor::Private {
        participants: ["ben".into(), "ana".into()],
    }
    .partition_key();

    svc.moderation.soft_delete(&key, ids[4], "ana").await.unwrap();
    svc.moderation.soft_delete(&key, ids[1], "ana").await.unwrap();

    let page = svc.history.handle(&history("ben", "ana", None, 20)).await.unwrap();
    let seqs: Vec<u64> = page.messages.iter().map(|m| m.sequence_number).collect();
    assert_eq!(seqs, vec![4, 3, 1]);
    assert!(!page.has_more);

    assert_eq!(svc.teardown.destroy(&key).await.unwrap(), 5);
    let page = svc.history.handle(&history("ben", "ana", None, 20)).await.unwrap();
    assert!(page.messages.is_empty());

    let restarted = svc.ingestion.ingest(&dm("ben", "ana", "fresh")).await.unwrap();
    assert_eq!(restarted.sequence_number, 1);
}

#[tokio::test]
async fn test_cold_cache_reads_and_deletes_keep_the_latest_page() {
    let svc = service(100);
    let mut ids = Vec::new();
    for i in 1..=60 {
        let persisted = svc.ingestion.ingest(&dm("ana", "ben", &format!("m{i}"))).await.unwrap();
        ids.push(persisted.message_id);
    }
    let key = msgsvc_core::ConversationDescriptor::Private {
        participants: ["ana".into(), "ben".into()],
    }
    .partition_key();
    svc.cache.evict(&key).await.unwrap();

    let older = svc.history.handle(&history("ana", "ben", Some(30), 10)).await.unwrap();
    assert_eq!(older.messages.first().map(|m| m.sequence_number), Some(29));
    svc.moderation.soft_delete(&key, ids[9], "ana").await.unwrap();

    let latest = svc.history.handle(&history("ben", "ana", None, 10)).await.unwrap();
    let seqs: Vec<u64> = latest.messages.iter().map(|m| m.sequence_number).collect();
    assert_eq!(seqs, (51..=60).rev().collect::<Vec<_>>());
    assert!(latest.has_more);
}
