//! Dealroom Notify - notification side channel
//!
//! Informs actors of state changes after they have committed. Delivery is
//! asynchronous and best-effort: a slow or failing sink never blocks, retries
//! or alters the core transition that triggered it.

#![deny(unsafe_code)]

mod emitter;
mod notification;
mod sink;

pub use emitter::{NotificationEmitter, DEFAULT_CHANNEL_CAPACITY};
pub use notification::{Notification, NotificationKind};
pub use sink::{BroadcastNotificationSink, MemoryNotificationSink, NotificationSink, NotifyError};
