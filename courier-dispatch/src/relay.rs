use async_trait::async_trait;

use crate::{
    error::RelayError,
    types::{MessageJob, RelayConfig},
};

/// What the relay hands back for an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReceipt {
    pub message_id: Option<String>,
}

/// Sends one job through the outbound relay.
///
/// Implementations must be safe to call concurrently: the pool shares one
/// instance across every in-flight job.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn send(&self, job: &MessageJob, config: &RelayConfig)
    -> Result<RelayReceipt, RelayError>;
}
