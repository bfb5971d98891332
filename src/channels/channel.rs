//! The `Channel` trait and the message envelope every transport produces.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::conversation::{InboundEvent, OutboundMessage, Sender};
use crate::error::ChannelError;
use crate::profile::UserId;

/// An event received on a channel, tagged with who sent it.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Name of the channel it arrived on.
    pub channel: String,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub event: InboundEvent,
    /// Transport-specific data needed to acknowledge the event.
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: impl Into<String>, user_id: UserId, event: InboundEvent) -> Self {
        Self {
            channel: channel.into(),
            user_id,
            user_name: None,
            event,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// The sender as the conversation engine sees it.
    pub fn sender(&self) -> Sender {
        let sender = Sender::new(self.user_id);
        match &self.user_name {
            Some(name) => sender.with_display_name(name.clone()),
            None => sender,
        }
    }
}

/// Stream of inbound messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short, unique channel name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Start receiving. The stream ends when the transport stops.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver one message to its recipient.
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;

    /// Tell the transport an event was handled (e.g. answer a button press).
    async fn acknowledge(&self, _message: &IncomingMessage) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_carries_display_name() {
        let msg = IncomingMessage::new("cli", UserId(4), InboundEvent::text("hi"))
            .with_user_name("Rina");
        let sender = msg.sender();
        assert_eq!(sender.user_id, UserId(4));
        assert_eq!(sender.display_name.as_deref(), Some("Rina"));

        let anonymous = IncomingMessage::new("cli", UserId(4), InboundEvent::text("hi"));
        assert!(anonymous.sender().display_name.is_none());
    }
}
