//! Device hotplug notifier seam
//!
//! The OS/desktop-environment notifier is an external collaborator. It is
//! consulted once at startup to enumerate devices already present; after
//! that the application shell forwards its attach/detach notifications to
//! `DeviceRegistry::device_attached` / `device_detached` directly.

use crate::device::handler::DeviceDescriptor;

/// Query interface over the platform's device hotplug service
pub trait DeviceNotifier: Send + Sync {
    /// Devices of the given capability kind that are present right now
    fn devices_matching(&self, kind: &str) -> Vec<DeviceDescriptor>;
}
