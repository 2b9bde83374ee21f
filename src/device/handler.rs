//! Device handles and handler factories
//!
//! Factories are an open extension axis: the registry offers every attach
//! notification to each registered factory in order and the first one that
//! claims the device creates its handle. New device kinds plug in by
//! implementing `DeviceHandlerFactory`; the registry stays agnostic to how
//! many exist.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Capability kind of storage-volume descriptors
pub const STORAGE_VOLUME_KIND: &str = "storage-volume";

/// Snapshot of an attached device as reported by the hotplug notifier
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Opaque hotplug token (e.g. a hardware UDI); detach notifications
    /// carry the same token
    pub token: String,

    /// Capability kind used for notifier enumeration
    pub kind: String,

    /// Filesystem UUID, when the volume exposes one
    pub uuid: Option<String>,

    /// Human-readable volume label
    pub label: Option<String>,

    /// Current mount path; absent while the volume is not mounted
    pub mount_path: Option<PathBuf>,
}

/// One currently-known storage device
///
/// Owned exclusively by the registry; consumers only ever receive resolved
/// values (ids and paths), never the handle itself.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device_id: i64,
    mount_path: PathBuf,
    handler_kind: &'static str,
    match_token: String,
}

impl DeviceHandle {
    pub fn new(
        device_id: i64,
        mount_path: PathBuf,
        handler_kind: &'static str,
        match_token: String,
    ) -> Self {
        Self {
            device_id,
            mount_path,
            handler_kind,
            match_token,
        }
    }

    /// Stable persisted identity of the device
    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    /// Mount path the device is currently accessible at
    pub fn mount_path(&self) -> &PathBuf {
        &self.mount_path
    }

    /// Kind of the factory that created this handle
    pub fn handler_kind(&self) -> &'static str {
        self.handler_kind
    }

    /// True if a detach notification's token refers to this handle
    pub fn matches_token(&self, token: &str) -> bool {
        self.match_token == token
    }
}

/// Pluggable capability provider for one kind of device
#[async_trait]
pub trait DeviceHandlerFactory: Send + Sync {
    /// Capability kind this factory handles, used for startup enumeration
    fn kind(&self) -> &'static str;

    /// Whether this factory claims the device
    fn can_handle(&self, descriptor: &DeviceDescriptor) -> bool;

    /// Create the handle for a claimed device, assigning or recovering its
    /// stable id
    async fn create_handle(&self, descriptor: &DeviceDescriptor) -> Result<DeviceHandle>;
}

/// Handler for mounted mass-storage volumes identified by filesystem UUID
///
/// The id for a volume is recovered from the catalog when the same UUID was
/// seen before, otherwise a new catalog row is registered. Either way the
/// catalog's last-known mount point is refreshed, so resolution for this
/// device keeps working after it detaches.
pub struct VolumeHandlerFactory {
    catalog: Arc<dyn Catalog>,
}

impl VolumeHandlerFactory {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl DeviceHandlerFactory for VolumeHandlerFactory {
    fn kind(&self) -> &'static str {
        STORAGE_VOLUME_KIND
    }

    fn can_handle(&self, descriptor: &DeviceDescriptor) -> bool {
        descriptor.kind == STORAGE_VOLUME_KIND
            && descriptor.uuid.is_some()
            && descriptor.mount_path.is_some()
    }

    async fn create_handle(&self, descriptor: &DeviceDescriptor) -> Result<DeviceHandle> {
        let uuid = descriptor
            .uuid
            .as_deref()
            .ok_or_else(|| Error::DeviceHandler("volume descriptor without uuid".into()))?;
        let mount_path = descriptor
            .mount_path
            .clone()
            .ok_or_else(|| Error::DeviceHandler("volume descriptor without mount path".into()))?;

        let device_id = match self.catalog.device_id("uuid", uuid).await? {
            Some(id) => {
                self.catalog.set_last_mount_point(id, &mount_path).await?;
                id
            }
            None => {
                self.catalog
                    .register_device("uuid", uuid, &mount_path)
                    .await?
            }
        };

        Ok(DeviceHandle::new(
            device_id,
            mount_path,
            STORAGE_VOLUME_KIND,
            descriptor.token.clone(),
        ))
    }
}
