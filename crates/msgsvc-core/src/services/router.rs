//! Conversation routing

use crate::domain::{ConversationDescriptor, ConversationIds, ConversationKind, PartitionKey};
use crate::error::RoutingError;

/// Maps a conversation to its canonical partition. Pure and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationRouter;

impl ConversationRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn describe(
        &self,
        chat_type: &str,
        ids: &ConversationIds,
    ) -> Result<ConversationDescriptor, RoutingError> {
        let kind: ConversationKind = chat_type.parse()?;
        ConversationDescriptor::from_ids(kind, ids)
    }

    pub fn route(&self, chat_type: &str, ids: &ConversationIds) -> Result<PartitionKey, RoutingError> {
        Ok(self.describe(chat_type, ids)?.partition_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(server: Option<&str>, channel: Option<&str>, target: Option<&str>, sender: Option<&str>) -> ConversationIds {
        ConversationIds {
            server_id: server.map(String::from),
            channel_id: channel.map(String::from),
            target_id: target.map(String::from),
            sender_id: sender.map(String::from),
        }
    }

    #[test]
    fn test_server_key() {
        let key = ConversationRouter::new()
            .route("server", &ids(Some("s1"), Some("c9"), None, Some("u1")))
            .unwrap();
        assert_eq!(key.as_str(), "server:s1:c9");
    }

    #[test]
    fn test_server_falls_back_to_target_id() {
        let key = ConversationRouter::new()
            .route("server", &ids(None, Some("c9"), Some("s1"), None))
            .unwrap();
        assert_eq!(key.as_str(), "server:s1:c9");
    }

    #[test]
    fn test_private_key_is_symmetric() {
        let router = ConversationRouter::new();
        let pairs = [("alice", "bob"), ("42", "7"), ("b", "a"), ("same", "same"), ("Z", "a")];
        for (a, b) in pairs {
            let ab = router.route("private", &ids(None, None, Some(b), Some(a))).unwrap();
            let ba = router.route("private", &ids(None, None, Some(a), Some(b))).unwrap();
            assert_eq!(ab, ba);
            assert!(ab.as_str().starts_with("private:"));
        }
        let key = router.route("private", &ids(None, None, Some("bob"), Some("alice"))).unwrap();
        assert_eq!(key.as_str(), "private:alice:bob");
    }

    #[test]
    fn test_group_key() {
        let key = ConversationRouter::new()
            .route("group", &ids(None, None, Some("g1"), Some("u1")))
            .unwrap();
        assert_eq!(key.as_str(), "group:g1");
    }

    #[test]
    fn test_kinds_never_collide() {
        let router = ConversationRouter::new();
        let group = router.route("group", &ids(None, None, Some("x"), Some("y"))).unwrap();
        let private = router.route("private", &ids(None, None, Some("x"), Some("y"))).unwrap();
        assert_ne!(group, private);
    }

    #[test]
    fn test_missing_identifiers() {
        let router = ConversationRouter::new();
        assert_eq!(
            router.route("server", &ids(Some("s1"), None, None, None)),
            Err(RoutingError::MissingIdentifier("channel_id"))
        );
        assert_eq!(
            router.route("private", &ids(None, None, None, Some("u1"))),
            Err(RoutingError::MissingIdentifier("target_id"))
        );
        assert_eq!(
            router.route("group", &ids(None, None, Some("   "), Some("u1"))),
            Err(RoutingError::MissingIdentifier("target_id"))
        );
    }

    #[test]
    fn test_unsupported_kind() {
        assert_eq!(
            ConversationRouter::new().route("broadcast", &ids(None, None, Some("g"), None)),
            Err(RoutingError::UnsupportedKind("broadcast".into()))
        );
    }

    #[test]
    fn test_separator_in_ids_is_rejected() {
        let err = ConversationRouter::new()
            .route("server", &ids(Some("a:b"), Some("c"), None, None))
            .unwrap_err();
        assert!(matches!(err, RoutingError::InvalidIdentifier { field: "server_id", .. }));
    }
}
