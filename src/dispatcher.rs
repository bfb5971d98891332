//! Main run loop: reads every channel and feeds per-user workers.
//!
//! Each active user gets a worker task with its own queue, so one user's
//! events are handled strictly in arrival order while different users run
//! concurrently. Idle workers exit and are respawned on the next event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channels::{ChannelManager, IncomingMessage};
use crate::conversation::ConversationEngine;
use crate::error::Error;
use crate::profile::UserId;

/// How long shutdown waits for queued events to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Worker {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    handle: JoinHandle<()>,
}

pub struct Dispatcher {
    engine: Arc<ConversationEngine>,
    channels: Arc<ChannelManager>,
    idle_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<ConversationEngine>,
        channels: Arc<ChannelManager>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            channels,
            idle_timeout,
        }
    }

    /// Run until Ctrl+C or until every channel stream has ended.
    pub async fn run(self) -> Result<(), Error> {
        let mut stream = self.channels.start_all().await?;
        let mut workers: HashMap<UserId, Worker> = HashMap::new();

        let mut prune = tokio::time::interval(self.idle_timeout);
        prune.tick().await; // Skip immediate first tick

        tracing::info!("Matchbot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                _ = prune.tick() => {
                    let before = workers.len();
                    workers.retain(|_, w| !w.handle.is_finished());
                    tracing::debug!(pruned = before - workers.len(), active = workers.len(), "Pruned finished workers");
                    continue;
                }
                msg = stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            self.dispatch(&mut workers, message);
        }

        // Closing the queues lets workers finish what's already queued.
        let handles: Vec<_> = workers.into_values().map(|w| w.handle).collect();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(handles)).await;
        if drained.is_err() {
            tracing::warn!("Workers still busy after shutdown grace period");
        }

        self.channels.shutdown_all().await?;
        Ok(())
    }

    fn dispatch(&self, workers: &mut HashMap<UserId, Worker>, message: IncomingMessage) {
        let user_id = message.user_id;

        let (message, previous) = match workers.remove(&user_id) {
            Some(worker) => match worker.tx.send(message) {
                Ok(()) => {
                    workers.insert(user_id, worker);
                    return;
                }
                // The worker went idle and closed its queue; it may still be
                // draining, so the replacement waits for it.
                Err(mpsc::error::SendError(message)) => (message, Some(worker.handle)),
            },
            None => (message, None),
        };

        let worker = self.spawn_worker(user_id, message, previous);
        workers.insert(user_id, worker);
    }

    fn spawn_worker(
        &self,
        user_id: UserId,
        first: IncomingMessage,
        previous: Option<JoinHandle<()>>,
    ) -> Worker {
        let (tx, rx) = mpsc::unbounded_channel();
        // Cannot fail: we hold the receiver.
        let _ = tx.send(first);

        let engine = Arc::clone(&self.engine);
        let channels = Arc::clone(&self.channels);
        let idle_timeout = self.idle_timeout;

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            tracing::debug!(user_id = %user_id, "Worker started");
            run_worker(rx, &engine, &channels, idle_timeout).await;
            tracing::debug!(user_id = %user_id, "Worker stopped");
        });

        Worker { tx, handle }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
    engine: &ConversationEngine,
    channels: &ChannelManager,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(message)) => process(message, engine, channels).await,
            Ok(None) => return,
            Err(_) => {
                rx.close();
                while let Some(message) = rx.recv().await {
                    process(message, engine, channels).await;
                }
                return;
            }
        }
    }
}

/// Handle one event and deliver every resulting message.
pub async fn process(message: IncomingMessage, engine: &ConversationEngine, channels: &ChannelManager) {
    if let Err(e) = channels.acknowledge(&message).await {
        tracing::warn!(user_id = %message.user_id, error = %e, "Failed to acknowledge event");
    }

    tracing::debug!(
        user_id = %message.user_id,
        channel = %message.channel,
        event = message.event.kind(),
        "Handling event"
    );

    let replies = engine.handle(&message.sender(), message.event).await;
    for reply in replies {
        if let Err(e) = channels.send(&reply).await {
            tracing::warn!(recipient = %reply.recipient, error = %e, "Failed to deliver message");
        }
    }
}
