//! Fire-and-forget notification emitter.
//!
//! `emit` never awaits and never fails. Notifications go through a bounded
//! queue drained by one background task; when the queue is full or the task
//! is gone the notification is dropped with a warning.

use crate::notification::Notification;
use crate::sink::NotificationSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default queue capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

enum Envelope {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct EmitterStats {
    queued: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Handle for queueing notifications to a sink.
#[derive(Clone)]
pub struct NotificationEmitter {
    tx: Option<mpsc::Sender<Envelope>>,
    stats: Arc<EmitterStats>,
}

impl NotificationEmitter {
    /// Start the delivery task on the current tokio runtime.
    ///
    /// Without a runtime the emitter comes up disabled instead of panicking.
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> Self {
        let stats = Arc::new(EmitterStats::default());
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime available, notifications disabled");
                return Self { tx: None, stats };
            }
        };

        let (tx, rx) = mpsc::channel(capacity.max(1));
        handle.spawn(deliver_loop(rx, sink, stats.clone()));
        Self { tx: Some(tx), stats }
    }

    /// An emitter that discards everything.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            stats: Arc::new(EmitterStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a notification without waiting.
    pub fn emit(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };

        let kind = notification.kind;
        match tx.try_send(Envelope::Deliver(notification)) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = %kind, "Notification queue full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = %kind, "Notification task stopped, dropping notification");
            }
        }
    }

    /// Wait until everything queued before this call has been handed to the sink.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Envelope::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Notifications accepted into the queue.
    pub fn queued(&self) -> u64 {
        self.stats.queued.load(Ordering::Relaxed)
    }

    /// Notifications dropped before reaching the sink.
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    /// Notifications the sink refused.
    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }
}

async fn deliver_loop(
    mut rx: mpsc::Receiver<Envelope>,
    sink: Arc<dyn NotificationSink>,
    stats: Arc<EmitterStats>,
) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Deliver(notification) => match sink.deliver(&notification).await {
                Ok(()) => debug!(kind = %notification.kind, "Notification delivered"),
                Err(err) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(kind = %notification.kind, error = %err, "Notification delivery failed");
                }
            },
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Notification channel closed");
}
