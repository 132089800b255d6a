//! Outbound bus events

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{Attachment, Message, MessageView};
use crate::error::{ChatError, IngestionStage};

pub const TOPIC_MESSAGE_PERSISTED: &str = "message.persisted";
pub const TOPIC_HISTORY_RESPONSE: &str = "chat.history.response";
pub const TOPIC_MESSAGE_DELETED: &str = "message.deleted";
pub const TOPIC_PARTITION_DESTROYED: &str = "partition.destroyed";

pub const ERROR_TOPIC_MESSAGE_SAVING: &str = "message.saving";
pub const ERROR_TOPIC_HISTORY_GET: &str = "history.get";
pub const ERROR_TOPIC_MESSAGE_DELETE: &str = "message.delete.failed";
pub const ERROR_TOPIC_CONVERSATION_DESTROY: &str = "conversation.destroy.failed";

/// `message.persisted`. Content is plaintext: the event targets the internal bus, not storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub message_id: Uuid,
    pub channel_id: String,
    pub sender_id: String,
    pub sequence_number: u64,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub reactions: BTreeMap<String, BTreeSet<String>>,
    pub mentions: BTreeSet<String>,
    pub reply_to: Option<Uuid>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl PersistedMessage {
    pub fn new(message: &Message, plaintext: String) -> Self {
        Self {
            message_id: message.message_id,
            channel_id: message.channel_id.clone(),
            sender_id: message.sender_id.clone(),
            sequence_number: message.sequence_number,
            content: plaintext,
            attachments: message.attachments.clone(),
            reactions: message.reactions.clone(),
            mentions: message.mentions.clone(),
            reply_to: message.reply_to,
            timestamp: message.timestamp,
        }
    }
}

/// `chat.history.response`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub sender_id: String,
    pub request_id: String,
    pub channel_id: String,
    pub messages: Vec<MessageView>,
    pub has_more: bool,
}

/// `message.deleted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedMessage {
    pub message_id: Uuid,
    pub channel_id: String,
    pub sequence_number: u64,
    pub deleted_by: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub deleted_at: DateTime<Utc>,
}

/// `partition.destroyed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyedPartition {
    pub partition_key: String,
    pub messages_removed: u64,
    pub requested_by: String,
}

/// Error report published on the failing command's error topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(skip)]
    pub topic: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<IngestionStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub time: DateTime<Utc>,
}

impl ErrorEvent {
    pub fn new(topic: &'static str, error: &ChatError, request_id: Option<String>) -> Self {
        Self {
            topic,
            message: error.to_string(),
            stage: error.stage(),
            request_id,
            time: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    MessagePersisted(PersistedMessage),
    HistoryResponse(HistoryResponse),
    MessageDeleted(DeletedMessage),
    PartitionDestroyed(DestroyedPartition),
    Failure(ErrorEvent),
}

impl OutboundEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundEvent::MessagePersisted(_) => TOPIC_MESSAGE_PERSISTED,
            OutboundEvent::HistoryResponse(_) => TOPIC_HISTORY_RESPONSE,
            OutboundEvent::MessageDeleted(_) => TOPIC_MESSAGE_DELETED,
            OutboundEvent::PartitionDestroyed(_) => TOPIC_PARTITION_DESTROYED,
            OutboundEvent::Failure(e) => e.topic,
        }
    }

    /// Partitioning key for the bus record, when the event has a natural one.
    pub fn record_key(&self) -> Option<String> {
        match self {
            OutboundEvent::MessagePersisted(m) => Some(m.message_id.to_string()),
            OutboundEvent::HistoryResponse(r) => Some(r.request_id.clone()),
            OutboundEvent::MessageDeleted(d) => Some(d.message_id.to_string()),
            OutboundEvent::PartitionDestroyed(p) => Some(p.partition_key.clone()),
            OutboundEvent::Failure(e) => e.request_id.clone(),
        }
    }

    pub fn payload(&self) -> Result<serde_json::Value, ChatError> {
        let value = match self {
            OutboundEvent::MessagePersisted(m) => serde_json::to_value(m)?,
            OutboundEvent::HistoryResponse(r) => serde_json::to_value(r)?,
            OutboundEvent::MessageDeleted(d) => serde_json::to_value(d)?,
            OutboundEvent::PartitionDestroyed(p) => serde_json::to_value(p)?,
            OutboundEvent::Failure(e) => serde_json::to_value(e)?,
        };
        Ok(value)
    }

    pub fn to_record(&self) -> Result<BusRecord, ChatError> {
        Ok(BusRecord {
            topic: self.topic().to_string(),
            key: self.record_key(),
            payload: self.payload()?,
        })
    }
}

/// Wire form of an outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRecord {
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub payload: serde_json::Value,
}
