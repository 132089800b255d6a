//! Outbound event port

use async_trait::async_trait;

use crate::domain::OutboundEvent;
use crate::error::ChatError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: OutboundEvent) -> Result<(), ChatError>;
}
