//! Merges every channel's stream and routes replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream::select_all;

use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::conversation::OutboundMessage;
use crate::error::ChannelError;
use crate::profile::UserId;

/// Owns the active channels.
///
/// Outbound messages go to the channel their recipient last wrote from;
/// recipients never seen since startup go to the first channel added.
pub struct ChannelManager {
    channels: Vec<Arc<dyn Channel>>,
    routes: Arc<Mutex<HashMap<UserId, String>>>,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        tracing::info!(channel = channel.name(), "Channel registered");
        self.channels.push(Arc::from(channel));
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start every channel and merge their streams into one.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let stream = channel.start().await?;
            tracing::info!(channel = channel.name(), "Channel started");
            streams.push(stream);
        }

        let routes = Arc::clone(&self.routes);
        let merged = select_all(streams).inspect(move |msg: &IncomingMessage| {
            routes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(msg.user_id, msg.channel.clone());
        });
        Ok(Box::pin(merged))
    }

    fn route(&self, recipient: UserId) -> Option<&Arc<dyn Channel>> {
        let name = self
            .routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&recipient)
            .cloned();
        name.and_then(|n| self.channels.iter().find(|c| c.name() == n))
            .or_else(|| self.channels.first())
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let channel = self
            .route(message.recipient)
            .ok_or_else(|| ChannelError::SendFailed {
                name: "none".into(),
                reason: "no channels registered".into(),
            })?;
        channel.send(message).await
    }

    pub async fn acknowledge(&self, message: &IncomingMessage) -> Result<(), ChannelError> {
        match self.channels.iter().find(|c| c.name() == message.channel) {
            Some(channel) => channel.acknowledge(message).await,
            None => Ok(()),
        }
    }

    /// Health-check every channel; the first failure is returned.
    pub async fn health_check_all(&self) -> Result<(), ChannelError> {
        for channel in &self.channels {
            channel.health_check().await?;
        }
        Ok(())
    }

    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
        Ok(())
    }
}
