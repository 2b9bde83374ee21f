//! Catalog seam
//!
//! The device registry persists nothing itself: device identity rows,
//! last-known mount points, and configured collection root folders all live
//! in the embedding application's media catalog. This module defines the
//! narrow interface the registry (and device handlers) consume, plus two
//! backends: a SQLite implementation and an in-memory one for tests and
//! embedded use.
//!
//! Paths handed to and from the catalog follow the portable persisted form:
//! root folder entries are stored relative to the device mount path, so a
//! remount never requires a catalog rewrite.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Storage interface consumed by the device layer
///
/// Implementations provide their own consistency; the registry holds no lock
/// while calling into them.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a previously-registered device id by its identity key
    /// (e.g. kind `"uuid"` with a filesystem UUID as identifier)
    async fn device_id(&self, kind: &str, identifier: &str) -> Result<Option<i64>>;

    /// Register a new device and allocate its stable id
    async fn register_device(
        &self,
        kind: &str,
        identifier: &str,
        mount_path: &Path,
    ) -> Result<i64>;

    /// Record the mount path a device was last seen at
    async fn set_last_mount_point(&self, device_id: i64, mount_path: &Path) -> Result<()>;

    /// Last mount path the device was seen at, if it was ever registered
    async fn last_mount_point(&self, device_id: i64) -> Result<Option<PathBuf>>;

    /// Configured collection root folders for a device, relative to its
    /// mount path
    async fn root_folder_entries(&self, device_id: i64) -> Result<Vec<String>>;

    /// Replace the configured root folders for a device
    async fn set_root_folder_entries(&self, device_id: i64, entries: &[String]) -> Result<()>;

    /// Drop all configured root folders for a device
    async fn remove_root_folder_entries(&self, device_id: i64) -> Result<()>;

    /// Device ids that currently have root folders configured
    async fn configured_device_ids(&self) -> Result<Vec<i64>>;
}
