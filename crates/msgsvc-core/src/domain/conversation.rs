//! Conversation descriptors and partition keys

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

const SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Server,
    Private,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Server => "server",
            ConversationKind::Private => "private",
            ConversationKind::Group => "group",
        }
    }
}

impl FromStr for ConversationKind {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "server" => Ok(ConversationKind::Server),
            "private" => Ok(ConversationKind::Private),
            "group" => Ok(ConversationKind::Group),
            other => Err(RoutingError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Raw identifiers as they arrive on the bus. Which ones are required depends on the kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationIds {
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
}

impl ConversationIds {
    /// Channel id reported back to clients: `channel_id`, else `target_id`.
    pub fn display_channel(&self) -> String {
        present(&self.channel_id)
            .or_else(|| present(&self.target_id))
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationDescriptor {
    Server { server_id: String, channel_id: String },
    Private { participants: [String; 2] },
    Group { group_id: String },
}

impl ConversationDescriptor {
    /// Validate the identifiers required by `kind` and build a descriptor.
    pub fn from_ids(kind: ConversationKind, ids: &ConversationIds) -> Result<Self, RoutingError> {
        match kind {
            ConversationKind::Server => {
                // `server_id` wins; producers that only know `target_id` send the server there.
                let server_id = present(&ids.server_id)
                    .or_else(|| present(&ids.target_id))
                    .ok_or(RoutingError::MissingIdentifier("server_id"))?;
                let channel_id =
                    present(&ids.channel_id).ok_or(RoutingError::MissingIdentifier("channel_id"))?;
                Ok(ConversationDescriptor::Server {
                    server_id: checked("server_id", server_id)?,
                    channel_id: checked("channel_id", channel_id)?,
                })
            }
            ConversationKind::Private => {
                let sender =
                    present(&ids.sender_id).ok_or(RoutingError::MissingIdentifier("sender_id"))?;
                let target =
                    present(&ids.target_id).ok_or(RoutingError::MissingIdentifier("target_id"))?;
                Ok(ConversationDescriptor::Private {
                    participants: [checked("sender_id", sender)?, checked("target_id", target)?],
                })
            }
            ConversationKind::Group => {
                let group_id =
                    present(&ids.target_id).ok_or(RoutingError::MissingIdentifier("target_id"))?;
                Ok(ConversationDescriptor::Group {
                    group_id: checked("target_id", group_id)?,
                })
            }
        }
    }

    pub fn kind(&self) -> ConversationKind {
        match self {
            ConversationDescriptor::Server { .. } => ConversationKind::Server,
            ConversationDescriptor::Private { .. } => ConversationKind::Private,
            ConversationDescriptor::Group { .. } => ConversationKind::Group,
        }
    }

    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::from(self)
    }
}

/// Canonical name of a conversation's partition, prefixed by its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&ConversationDescriptor> for PartitionKey {
    fn from(descriptor: &ConversationDescriptor) -> Self {
        let key = match descriptor {
            ConversationDescriptor::Server {
                server_id,
                channel_id,
            } => format!("server:{server_id}:{channel_id}"),
            ConversationDescriptor::Private { participants } => {
                let mut sorted = [participants[0].as_str(), participants[1].as_str()];
                sorted.sort_unstable();
                format!("private:{}:{}", sorted[0], sorted[1])
            }
            ConversationDescriptor::Group { group_id } => format!("group:{group_id}"),
        };
        PartitionKey(key)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn checked(field: &'static str, value: &str) -> Result<String, RoutingError> {
    if value.contains(SEPARATOR) {
        return Err(RoutingError::InvalidIdentifier {
            field,
            reason: format!("must not contain '{SEPARATOR}'"),
        });
    }
    Ok(value.to_string())
}
