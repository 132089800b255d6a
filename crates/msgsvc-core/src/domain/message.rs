//! Message entity and read models

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use msgsvc_security::Envelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::PartitionKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(alias = "file_url")]
    pub url: String,
}

/// A persisted chat message. `content` stays encrypted everywhere except in outbound views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub partition_key: PartitionKey,
    pub channel_id: String,
    pub sender_id: String,
    pub sequence_number: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub content: Envelope,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: BTreeSet<String>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub reactions: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub deleted_by: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn mark_deleted(&mut self, deleted_by: &str, at: DateTime<Utc>) {
        self.deleted = true;
        self.deleted_by = Some(deleted_by.to_string());
        self.deleted_at = Some(at);
    }
}

/// Millisecond-truncated now, so cached and stored copies compare equal.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Store query filter. Soft-deleted messages are always excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Exclusive upper bound on sequence number.
    pub before: Option<u64>,
}

impl HistoryFilter {
    pub fn before(before: Option<u64>) -> Self {
        Self { before }
    }

    pub fn matches(&self, message: &Message) -> bool {
        !message.deleted && self.before.map_or(true, |b| message.sequence_number < b)
    }
}

/// Plaintext rendering of a message for history responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: Uuid,
    pub channel_id: String,
    pub sender_id: String,
    pub sequence_number: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unreadable: bool,
    pub attachments: Vec<Attachment>,
    pub mentions: BTreeSet<String>,
    pub reply_to: Option<Uuid>,
    pub reactions: BTreeMap<String, BTreeSet<String>>,
    pub is_edited: bool,
}

impl MessageView {
    pub fn new(message: &Message, content: String, unreadable: bool) -> Self {
        Self {
            message_id: message.message_id,
            channel_id: message.channel_id.clone(),
            sender_id: message.sender_id.clone(),
            sequence_number: message.sequence_number,
            timestamp: message.timestamp,
            content,
            unreadable,
            attachments: message.attachments.clone(),
            mentions: message.mentions.clone(),
            reply_to: message.reply_to,
            reactions: message.reactions.clone(),
            is_edited: message.is_edited,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<MessageView>,
    pub has_more: bool,
}

impl HistoryPage {
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            has_more: false,
        }
    }
}
