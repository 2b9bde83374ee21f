//! Device abstraction layer
//!
//! Mount-point resolution and pluggable device handlers.

pub mod handler;
pub mod notify;
pub mod registry;

pub use handler::{
    DeviceDescriptor, DeviceHandle, DeviceHandlerFactory, VolumeHandlerFactory,
    STORAGE_VOLUME_KIND,
};
pub use notify::DeviceNotifier;
pub use registry::{DeviceRegistry, LOCAL_DEVICE_ID};
