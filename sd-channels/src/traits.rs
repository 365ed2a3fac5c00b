use crate::types::{InboundMessage, UserProfile};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique channel identifier, e.g. "slack".
    fn channel_id(&self) -> &str;

    /// Start receiving messages. Push to tx for each inbound message.
    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()>;
}

/// Resolves platform user ids to profiles for mention rendering.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup_user(&self, user_id: &str) -> Result<UserProfile>;
}
