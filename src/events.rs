//! Device event system
//!
//! One-to-many broadcasting of device attach/detach notifications via
//! `tokio::broadcast`. The registry emits lossily: a slow or absent
//! subscriber never blocks an attach or detach.

use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

/// Device lifecycle events emitted by the registry
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A handler claimed an attached device and its handle was registered
    DeviceAttached {
        device_id: i64,
        mount_path: PathBuf,
    },

    /// A live handle matched a detach notification and was removed
    DeviceDetached { device_id: i64 },
}

/// Broadcast bus for device events
pub struct EventBus {
    tx: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to device events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: DeviceEvent) {
        if self.tx.send(event).is_err() {
            trace!("device event dropped: no subscribers");
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
