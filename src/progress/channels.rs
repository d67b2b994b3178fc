//! Live progress notifications.
//!
//! Every session gets its own `tokio::sync::broadcast` channel, created lazily
//! when the first subscriber arrives. Publishing to a session nobody listens to
//! is a no-op. Channels are dropped once a terminal snapshot has been sent, which
//! closes every receiver after it drains.

use crate::progress::ProgressSnapshot;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Event name carried by every progress notification.
pub const PROGRESS_EVENT: &str = "progress.updated";

const DEFAULT_CAPACITY: usize = 64;

/// Topic name for a session, `csv-processing.<session_id>`.
pub fn channel_name(session_id: &str) -> String {
    format!("csv-processing.{}", session_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    pub session_id: String,
    pub progress: ProgressSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(session_id: impl Into<String>, progress: ProgressSnapshot) -> Self {
        Self {
            session_id: session_id.into(),
            progress,
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.progress.status.is_terminal()
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("failed to publish to {channel}: {reason}")]
    Unavailable { channel: String, reason: String },
}

/// Best-effort fan-out of progress events.
pub trait ProgressBroadcaster: Send + Sync {
    /// Deliver `event`, returning the number of subscribers reached.
    fn publish(&self, event: &ProgressEvent) -> Result<usize, BroadcastError>;
}

pub struct SessionChannels {
    senders: DashMap<String, broadcast::Sender<ProgressEvent>>,
    capacity: usize,
}

impl Default for SessionChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionChannels {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ProgressEvent> {
        self.senders
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.senders
            .get(session_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Remove channels whose subscribers have all gone away.
    pub fn prune_idle(&self) -> usize {
        let before = self.senders.len();
        self.senders.retain(|_, sender| sender.receiver_count() > 0);
        before.saturating_sub(self.senders.len())
    }
}

impl ProgressBroadcaster for SessionChannels {
    fn publish(&self, event: &ProgressEvent) -> Result<usize, BroadcastError> {
        let delivered = match self.senders.get(&event.session_id) {
            // A send error only means every receiver is gone.
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => 0,
        };

        if event.is_terminal() {
            self.senders.remove(&event.session_id);
        }

        Ok(delivered)
    }
}
