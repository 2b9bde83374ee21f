//! In-memory catalog backend
//!
//! Backs tests and embedders that do not want a database on disk. Device
//! ids are allocated from a monotonic counter starting at 1, matching the
//! SQLite backend's rowid behavior.

use crate::catalog::Catalog;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug)]
struct DeviceRow {
    id: i64,
    kind: String,
    identifier: String,
    last_mount_point: PathBuf,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    devices: Vec<DeviceRow>,
    root_folders: HashMap<i64, Vec<String>>,
}

/// Catalog backend held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    inner: Mutex<Inner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn device_id(&self, kind: &str, identifier: &str) -> Result<Option<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .devices
            .iter()
            .find(|d| d.kind == kind && d.identifier == identifier)
            .map(|d| d.id))
    }

    async fn register_device(
        &self,
        kind: &str,
        identifier: &str,
        mount_path: &Path,
    ) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .devices
            .iter_mut()
            .find(|d| d.kind == kind && d.identifier == identifier)
        {
            existing.last_mount_point = mount_path.to_path_buf();
            return Ok(existing.id);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.devices.push(DeviceRow {
            id,
            kind: kind.to_string(),
            identifier: identifier.to_string(),
            last_mount_point: mount_path.to_path_buf(),
        });
        Ok(id)
    }

    async fn set_last_mount_point(&self, device_id: i64, mount_path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.devices.iter_mut().find(|d| d.id == device_id) {
            row.last_mount_point = mount_path.to_path_buf();
        }
        Ok(())
    }

    async fn last_mount_point(&self, device_id: i64) -> Result<Option<PathBuf>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .map(|d| d.last_mount_point.clone()))
    }

    async fn root_folder_entries(&self, device_id: i64) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .root_folders
            .get(&device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_root_folder_entries(&self, device_id: i64, entries: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.root_folders.insert(device_id, entries.to_vec());
        Ok(())
    }

    async fn remove_root_folder_entries(&self, device_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.root_folders.remove(&device_id);
        Ok(())
    }

    async fn configured_device_ids(&self) -> Result<Vec<i64>> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<i64> = inner.root_folders.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
