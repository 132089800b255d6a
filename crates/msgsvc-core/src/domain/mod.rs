//! Domain entities and bus payloads

pub mod commands;
pub mod conversation;
pub mod events;
pub mod message;

pub use commands::{
    DeleteMessageCommand, DestroyConversationCommand, HistoryRequest, NewMessageCommand,
};
pub use conversation::{ConversationDescriptor, ConversationIds, ConversationKind, PartitionKey};
pub use events::{
    BusRecord, DeletedMessage, DestroyedPartition, ErrorEvent, HistoryResponse, OutboundEvent,
    PersistedMessage,
};
pub use message::{now_millis, Attachment, HistoryFilter, HistoryPage, Message, MessageView};
