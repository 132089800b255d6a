//! Inbound command dispatch

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, warn};

use super::deadline::bounded;
use super::history::HistoryService;
use super::ingestion::IngestionPipeline;
use super::moderation::MessageModeration;
use super::teardown::PartitionTeardown;
use crate::domain::commands::{
    TOPIC_CONVERSATION_DESTROY, TOPIC_HISTORY_GET, TOPIC_MESSAGE_DELETE, TOPIC_MESSAGE_NEW,
};
use crate::domain::events::{
    ERROR_TOPIC_CONVERSATION_DESTROY, ERROR_TOPIC_HISTORY_GET, ERROR_TOPIC_MESSAGE_DELETE,
    ERROR_TOPIC_MESSAGE_SAVING,
};
use crate::domain::{
    DeleteMessageCommand, DestroyConversationCommand, ErrorEvent, HistoryRequest,
    NewMessageCommand, OutboundEvent,
};
use crate::error::{Backend, ChatError, IngestionStage};
use crate::repositories::EventPublisher;

/// Routes inbound bus topics to the services and publishes what they produce.
///
/// Failures are published on the command's error topic and returned to the caller.
pub struct CommandDispatcher {
    ingestion: Arc<IngestionPipeline>,
    history: Arc<HistoryService>,
    moderation: Arc<MessageModeration>,
    teardown: Arc<PartitionTeardown>,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        ingestion: Arc<IngestionPipeline>,
        history: Arc<HistoryService>,
        moderation: Arc<MessageModeration>,
        teardown: Arc<PartitionTeardown>,
        publisher: Arc<dyn EventPublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            ingestion,
            history,
            moderation,
            teardown,
            publisher,
            timeout,
        }
    }

    pub fn topics() -> [&'static str; 4] {
        [
            TOPIC_MESSAGE_NEW,
            TOPIC_HISTORY_GET,
            TOPIC_MESSAGE_DELETE,
            TOPIC_CONVERSATION_DESTROY,
        ]
    }

    /// Handle one inbound record. Returns the events it produced, all already published.
    pub async fn dispatch(&self, topic: &str, payload: Value) -> Result<Vec<OutboundEvent>, ChatError> {
        match topic {
            TOPIC_MESSAGE_NEW => {
                let result = match parse::<NewMessageCommand>(payload) {
                    Ok(command) => self.ingestion.ingest(&command).await,
                    Err(e) => Err(e.at_stage(IngestionStage::Validation)),
                };
                match result {
                    Ok(persisted) => Ok(vec![OutboundEvent::MessagePersisted(persisted)]),
                    Err(e) => Err(self.fail(ERROR_TOPIC_MESSAGE_SAVING, e, None).await),
                }
            }
            TOPIC_HISTORY_GET => {
                let request_id = payload
                    .get("request_id")
                    .and_then(Value::as_str)
                    .map(String::from);
                let result = match parse::<HistoryRequest>(payload) {
                    Ok(request) => self.history.handle(&request).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(response) => self.emit(OutboundEvent::HistoryResponse(response)).await,
                    Err(e) => Err(self.fail(ERROR_TOPIC_HISTORY_GET, e, request_id).await),
                }
            }
            TOPIC_MESSAGE_DELETE => {
                let result = match parse::<DeleteMessageCommand>(payload) {
                    Ok(command) => self.moderation.handle(&command).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(deleted) => self.emit(OutboundEvent::MessageDeleted(deleted)).await,
                    Err(e) => Err(self.fail(ERROR_TOPIC_MESSAGE_DELETE, e, None).await),
                }
            }
            TOPIC_CONVERSATION_DESTROY => {
                let result = match parse::<DestroyConversationCommand>(payload) {
                    Ok(command) => self.teardown.handle(&command).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(destroyed) => self.emit(OutboundEvent::PartitionDestroyed(destroyed)).await,
                    Err(e) => Err(self.fail(ERROR_TOPIC_CONVERSATION_DESTROY, e, None).await),
                }
            }
            other => {
                warn!("Ignoring unknown command topic: {}", other);
                Err(ChatError::UnknownCommand(other.to_string()))
            }
        }
    }

    async fn emit(&self, event: OutboundEvent) -> Result<Vec<OutboundEvent>, ChatError> {
        bounded(Backend::Bus, self.timeout, self.publisher.publish(event.clone())).await?;
        Ok(vec![event])
    }

    async fn fail(&self, topic: &'static str, err: ChatError, request_id: Option<String>) -> ChatError {
        error!("Command failed, reporting on {}: {}", topic, err);
        let event = OutboundEvent::Failure(ErrorEvent::new(topic, &err, request_id));
        if let Err(e) = bounded(Backend::Bus, self.timeout, self.publisher.publish(event)).await {
            warn!("Could not publish error event on {}: {}", topic, e);
        }
        err
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, ChatError> {
    serde_json::from_value(payload).map_err(|e| ChatError::InvalidPayload(e.to_string()))
}
