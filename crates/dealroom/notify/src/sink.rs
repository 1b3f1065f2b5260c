//! Notification sinks

use crate::notification::Notification;
use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;

/// Channel capacity for broadcast subscribers
const BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound delivery collaborator. Called from the emitter's background task.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// In-memory sink for testing
#[derive(Default)]
pub struct MemoryNotificationSink {
    delivered: Mutex<Vec<Notification>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all delivered notifications
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }

    pub fn clear(&self) {
        self.delivered.lock().clear();
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.delivered.lock().push(notification.clone());
        Ok(())
    }
}

/// Republishes notifications to any number of live subscribers.
pub struct BroadcastNotificationSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotificationSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        // No subscribers is fine
        let _ = self.tx.send(notification.clone());
        Ok(())
    }
}
