//! Typed pub/sub topics feeding the channel list.
//!
//! Two topics exist: a zero-payload "reload requested" signal (published after
//! a feed or folder is created elsewhere) and a [`CountDelta`] stream. Each
//! topic is a `tokio::sync::broadcast` channel; a [`Subscription`] owns one
//! receiver and unsubscribes when dropped.

use crate::model::CountDelta;
use thiserror::Error;
use tokio::sync::broadcast;

/// Default per-topic buffer size.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Payload of the reload topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadRequested;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscriber fell behind and `0` messages were dropped.
    #[error("subscription lagged, {0} events dropped")]
    Lagged(u64),
    /// Every publisher is gone.
    #[error("event bus closed")]
    Closed,
}

/// Handle to one topic. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next event on this topic.
    pub async fn recv(&mut self) -> Result<T, SubscriptionError> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(SubscriptionError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(SubscriptionError::Closed),
        }
    }
}

/// Publisher side of both topics. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    reload_tx: broadcast::Sender<ReloadRequested>,
    count_tx: broadcast::Sender<CountDelta>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (reload_tx, _) = broadcast::channel(capacity);
        let (count_tx, _) = broadcast::channel(capacity);
        Self {
            reload_tx,
            count_tx,
        }
    }

    /// Ask every subscribed list to reload. Returns the number of receivers reached.
    pub fn request_reload(&self) -> usize {
        let reached = self.reload_tx.send(ReloadRequested).unwrap_or(0);
        tracing::debug!(receivers = reached, "Reload requested");
        reached
    }

    /// Publish an unread-count delta. Returns the number of receivers reached.
    pub fn publish_count(&self, delta: CountDelta) -> usize {
        let uuid = delta.uuid.clone();
        let reached = self.count_tx.send(delta).unwrap_or(0);
        tracing::debug!(uuid = %uuid, receivers = reached, "Count delta published");
        reached
    }

    pub fn subscribe_reload(&self) -> Subscription<ReloadRequested> {
        Subscription {
            rx: self.reload_tx.subscribe(),
        }
    }

    pub fn subscribe_counts(&self) -> Subscription<CountDelta> {
        Subscription {
            rx: self.count_tx.subscribe(),
        }
    }
}
