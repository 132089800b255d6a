//! Inbound bus payloads

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::conversation::ConversationIds;
use super::message::Attachment;

pub const TOPIC_MESSAGE_NEW: &str = "message.new";
pub const TOPIC_HISTORY_GET: &str = "chat.history.get";
pub const TOPIC_MESSAGE_DELETE: &str = "message.delete";
pub const TOPIC_CONVERSATION_DESTROY: &str = "conversation.destroy";

/// `message.new`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMessageCommand {
    pub chat_type: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[validate(length(min = 1))]
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

impl NewMessageCommand {
    pub fn conversation_ids(&self) -> ConversationIds {
        ConversationIds {
            server_id: self.server_id.clone(),
            channel_id: self.channel_id.clone(),
            target_id: self.target_id.clone(),
            sender_id: Some(self.sender_id.clone()),
        }
    }
}

/// `chat.history.get`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HistoryRequest {
    #[validate(length(min = 1))]
    pub request_id: String,
    pub chat_type: String,
    #[validate(length(min = 1))]
    pub sender_id: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub before: Option<u64>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub limit: Option<u32>,
}

impl HistoryRequest {
    pub fn conversation_ids(&self) -> ConversationIds {
        ConversationIds {
            server_id: self.server_id.clone(),
            channel_id: self.channel_id.clone(),
            target_id: self.target_id.clone(),
            sender_id: Some(self.sender_id.clone()),
        }
    }
}

/// `message.delete`: soft delete, the record stays in the store.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeleteMessageCommand {
    pub chat_type: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    pub message_id: Uuid,
    #[validate(length(min = 1))]
    pub deleted_by: String,
}

impl DeleteMessageCommand {
    pub fn conversation_ids(&self) -> ConversationIds {
        ConversationIds {
            server_id: self.server_id.clone(),
            channel_id: self.channel_id.clone(),
            target_id: self.target_id.clone(),
            sender_id: self.sender_id.clone(),
        }
    }
}

/// `conversation.destroy`: hard teardown of a whole partition.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DestroyConversationCommand {
    pub chat_type: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[validate(length(min = 1))]
    pub requested_by: String,
}

impl DestroyConversationCommand {
    pub fn conversation_ids(&self) -> ConversationIds {
        ConversationIds {
            server_id: self.server_id.clone(),
            channel_id: self.channel_id.clone(),
            target_id: self.target_id.clone(),
            sender_id: self.sender_id.clone(),
        }
    }
}
