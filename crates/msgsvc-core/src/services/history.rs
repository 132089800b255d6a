//! Paginated history: recency cache first, durable store for the rest

use std::sync::Arc;
use std::time::Duration;

use msgsvc_security::ContentCipher;
use msgsvc_shared::constants::{
    DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, UNREADABLE_CONTENT,
};
use tracing::{debug, error, info, warn};
use validator::Validate;

use super::deadline::bounded;
use super::gate::PartitionGate;
use super::recency_cache::RecencyCache;
use super::router::ConversationRouter;
use crate::domain::{
    HistoryFilter, HistoryPage, HistoryRequest, HistoryResponse, Message, MessageView, PartitionKey,
};
use crate::error::{Backend, ChatError};
use crate::repositories::MessageStore;

#[derive(Debug, Clone, Copy)]
pub struct HistoryOptions {
    pub default_limit: u32,
    pub max_limit: u32,
    pub timeout: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_HISTORY_LIMIT,
            max_limit: MAX_HISTORY_LIMIT,
            timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
        }
    }
}

pub struct HistoryService {
    router: ConversationRouter,
    cache: RecencyCache,
    store: Arc<dyn MessageStore>,
    cipher: Arc<ContentCipher>,
    gate: PartitionGate,
    options: HistoryOptions,
}

impl HistoryService {
    pub fn new(
        cache: RecencyCache,
        store: Arc<dyn MessageStore>,
        cipher: Arc<ContentCipher>,
        gate: PartitionGate,
        options: HistoryOptions,
    ) -> Self {
        Self {
            router: ConversationRouter::new(),
            cache,
            store,
            cipher,
            gate,
            options,
        }
    }

    /// Answer a `chat.history.get` request.
    pub async fn handle(&self, request: &HistoryRequest) -> Result<HistoryResponse, ChatError> {
        request.validate()?;
        let ids = request.conversation_ids();
        let key = self.router.route(&request.chat_type, &ids)?;
        let limit = request.limit.unwrap_or(self.options.default_limit);

        let page = self.fetch_page(&key, request.before, limit).await?;
        info!(
            "History {} for {}: {} message(s), has_more={}",
            request.request_id,
            key,
            page.messages.len(),
            page.has_more
        );

        Ok(HistoryResponse {
            sender_id: request.sender_id.clone(),
            request_id: request.request_id.clone(),
            channel_id: ids.display_channel(),
            messages: page.messages,
            has_more: page.has_more,
        })
    }

    /// One page of non-deleted messages below `before`, newest first.
    ///
    /// Either the whole page comes back or the call fails; store errors never yield a partial page.
    ///
    /// The cache only ever holds a window hanging off the newest message: a backfill is
    /// written back when it continues such a window, or when it is the first page itself.
    pub async fn fetch_page(
        &self,
        key: &PartitionKey,
        before: Option<u64>,
        limit: u32,
    ) -> Result<HistoryPage, ChatError> {
        if limit == 0 || limit > self.options.max_limit {
            return Err(ChatError::InvalidPayload(format!(
                "limit must be between 1 and {}",
                self.options.max_limit
            )));
        }
        if matches!(before, Some(b) if b <= 1) {
            return Ok(HistoryPage::empty());
        }
        let limit = limit as usize;
        let _admission = self.gate.shared(key).await;

        // 1. Cache, read one past the limit so a full page knows whether more exists
        let (cached, reaches_before) = self.cached_run(key, before, limit + 1).await;
        let lowest_cached = cached.last().map(|m| m.sequence_number);
        let mut visible: Vec<Message> = cached.into_iter().filter(|m| !m.deleted).collect();

        if visible.len() > limit {
            visible.truncate(limit);
            debug!("History page for {} served from cache", key);
            return Ok(HistoryPage {
                messages: self.render(&visible),
                has_more: true,
            });
        }

        // 2. Store backfill, strictly below everything the cache supplied
        let remaining = limit - visible.len();
        let backfill = if remaining > 0 {
            let upper = match (before, lowest_cached) {
                (Some(b), Some(low)) => Some(b.min(low)),
                (b, low) => b.or(low),
            };
            let filter = HistoryFilter::before(upper);
            bounded(Backend::Store, self.options.timeout, self.store.find(key, &filter, remaining))
                .await
                .map_err(|e| failed(key, e))?
        } else {
            Vec::new()
        };

        // 3. Repopulate, best effort, never with a run detached from the top
        let anchored = before.is_none() || reaches_before || lowest_cached.is_some();
        if anchored && !backfill.is_empty() {
            if let Err(e) = self.cache.put(key, &backfill).await {
                warn!("Cache repopulation for {} failed: {}", key, e);
            }
        }

        // 4. Count
        let total = bounded(
            Backend::Store,
            self.options.timeout,
            self.store.count(key, &HistoryFilter::before(before)),
        )
        .await
        .map_err(|e| failed(key, e))?;

        let returned = visible.len() + backfill.len();
        visible.extend(backfill);
        Ok(HistoryPage {
            messages: self.render(&visible),
            has_more: total > returned as u64,
        })
    }

    /// Leading contiguous run of the cached window below `before`. A gap means the cache
    /// is missing messages there, so everything past it is left to the store.
    ///
    /// Also reports whether the cache holds `before` itself, i.e. the window reaches down
    /// to the requested page.
    async fn cached_run(
        &self,
        key: &PartitionKey,
        before: Option<u64>,
        wanted: usize,
    ) -> (Vec<Message>, bool) {
        let upper = before.map(|b| b.saturating_add(1));
        let mut window = match self.cache.window_before(key, upper, wanted + 1).await {
            Ok(window) => window,
            Err(e) => {
                warn!("Cache read for {} failed, using store: {}", key, e);
                return (Vec::new(), false);
            }
        };

        let reaches_before = match (before, window.first()) {
            (Some(b), Some(top)) => top.sequence_number == b,
            _ => false,
        };
        if reaches_before {
            window.remove(0);
        }
        window.truncate(wanted);

        let mut expected = before.map(|b| b - 1);
        let mut run = Vec::with_capacity(window.len());
        for message in window {
            if expected.is_some_and(|seq| seq != message.sequence_number) {
                break;
            }
            expected = message.sequence_number.checked_sub(1);
            run.push(message);
        }
        (run, reaches_before)
    }

    fn render(&self, messages: &[Message]) -> Vec<MessageView> {
        messages
            .iter()
            .map(|m| match self.cipher.decrypt(&m.content) {
                Ok(text) => MessageView::new(m, text, false),
                Err(e) => {
                    warn!("Message {} in {} is unreadable: {}", m.message_id, m.partition_key, e);
                    MessageView::new(m, UNREADABLE_CONTENT.to_string(), true)
                }
            })
            .collect()
    }
}

fn failed(key: &PartitionKey, err: ChatError) -> ChatError {
    error!("History retrieval for {} failed: {}", key, err);
    err.history()
}
