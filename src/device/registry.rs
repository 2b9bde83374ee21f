//! Device registry
//!
//! Maintains the live mapping from stable device id to current mount path
//! and provides mount-point-independent path translation for the catalog's
//! `(device id, relative path)` references. Device id `-1` is the reserved
//! sentinel for the local filesystem root.
//!
//! ## Lock discipline
//!
//! The live-handle map is guarded by a single mutex held only across map
//! reads and writes. Catalog calls and factory calls always happen outside
//! the lock, so catalog or playback threads that call back into the
//! registry while holding their own locks cannot invert lock order against
//! it.

use crate::catalog::Catalog;
use crate::device::handler::{DeviceDescriptor, DeviceHandle, DeviceHandlerFactory};
use crate::device::notify::DeviceNotifier;
use crate::error::Result;
use crate::events::{DeviceEvent, EventBus};
use crate::paths::normalize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Sentinel device id meaning "local filesystem root"
pub const LOCAL_DEVICE_ID: i64 = -1;

/// Live device registry
///
/// Explicitly constructed by the composition root and shared via `Arc`;
/// there is no global instance.
pub struct DeviceRegistry {
    handles: Mutex<HashMap<i64, DeviceHandle>>,
    factories: RwLock<Vec<Arc<dyn DeviceHandlerFactory>>>,
    catalog: Arc<dyn Catalog>,
    events: EventBus,
}

impl DeviceRegistry {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            factories: RwLock::new(Vec::new()),
            catalog,
            events: EventBus::default(),
        }
    }

    /// Register a handler factory; offered devices are scanned in
    /// registration order and the first claim wins
    pub fn register_factory(&self, factory: Arc<dyn DeviceHandlerFactory>) {
        self.factories.write().unwrap().push(factory);
    }

    /// Subscribe to attach/detach events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Offer every currently-present device to the registered factories
    ///
    /// Called once at startup, before hotplug notifications start flowing.
    pub async fn scan_devices(&self, notifier: &dyn DeviceNotifier) {
        let kinds: Vec<&'static str> = {
            let factories = self.factories.read().unwrap();
            let mut kinds: Vec<&'static str> = factories.iter().map(|f| f.kind()).collect();
            kinds.dedup();
            kinds
        };

        for kind in kinds {
            for descriptor in notifier.devices_matching(kind) {
                self.device_attached(&descriptor).await;
            }
        }
    }

    /// Handle a device-attach notification
    ///
    /// The first factory that claims the descriptor creates the handle. A
    /// claiming factory that fails to produce one is logged and the scan
    /// stops; other factories are not offered a device once it was claimed.
    /// An existing handle with the same resulting id is stale and gets
    /// replaced rather than duplicated.
    pub async fn device_attached(&self, descriptor: &DeviceDescriptor) {
        let factory = {
            let factories = self.factories.read().unwrap();
            factories
                .iter()
                .find(|f| f.can_handle(descriptor))
                .cloned()
        };

        let Some(factory) = factory else {
            debug!("no handler claimed device {}", descriptor.token);
            return;
        };

        let handle = match factory.create_handle(descriptor).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    "factory {} claimed device {} but could not create a handle: {}",
                    factory.kind(),
                    descriptor.token,
                    e
                );
                return;
            }
        };

        let device_id = handle.device_id();
        let mount_path = handle.mount_path().clone();
        {
            let mut handles = self.handles.lock().unwrap();
            if handles.contains_key(&device_id) {
                info!("device id {} already registered, replacing stale handle", device_id);
            }
            // Two live devices must never report the same mount path; the
            // longest-prefix rule cannot distinguish them.
            let duplicate_mount = handles
                .values()
                .any(|h| h.device_id() != device_id && *h.mount_path() == mount_path);
            if duplicate_mount {
                warn!(
                    "device {} reports mount path {} already in use by another device",
                    device_id,
                    mount_path.display()
                );
                debug_assert!(!duplicate_mount, "duplicate mount path across live devices");
            }
            handles.insert(device_id, handle);
        }

        info!("attached device {} at {}", device_id, mount_path.display());
        self.events.emit_lossy(DeviceEvent::DeviceAttached {
            device_id,
            mount_path,
        });
    }

    /// Handle a device-detach notification, matching on the hotplug token
    pub fn device_detached(&self, token: &str) {
        let removed = {
            let mut handles = self.handles.lock().unwrap();
            let device_id = handles
                .values()
                .find(|h| h.matches_token(token))
                .map(|h| h.device_id());
            device_id.and_then(|id| handles.remove(&id))
        };

        match removed {
            Some(handle) => {
                info!("detached device {}", handle.device_id());
                self.events.emit_lossy(DeviceEvent::DeviceDetached {
                    device_id: handle.device_id(),
                });
            }
            None => debug!("detach notification for unknown device {}", token),
        }
    }

    /// Resolve the device owning an absolute path
    ///
    /// Longest-prefix match over live mount paths, so nested mounts resolve
    /// to the innermost device. Returns `LOCAL_DEVICE_ID` when no mount
    /// path is a prefix.
    pub fn resolve_device_id(&self, absolute: &Path) -> i64 {
        let absolute = normalize(absolute);
        let handles = self.handles.lock().unwrap();

        let mut best_id = LOCAL_DEVICE_ID;
        let mut best_len = 0usize;
        for handle in handles.values() {
            let mount = handle.mount_path();
            let len = mount.as_os_str().len();
            if absolute.starts_with(mount) && len > best_len {
                best_id = handle.device_id();
                best_len = len;
            }
        }
        best_id
    }

    /// True iff a handle for this id is currently registered
    ///
    /// The sentinel id is a caller-side special case, not answered here.
    pub fn is_mounted(&self, device_id: i64) -> bool {
        self.handles.lock().unwrap().contains_key(&device_id)
    }

    /// Current mount path of a live device
    pub fn mount_path_for(&self, device_id: i64) -> Option<PathBuf> {
        self.handles
            .lock()
            .unwrap()
            .get(&device_id)
            .map(|h| h.mount_path().clone())
    }

    /// All live device ids, plus the sentinel (root is always "mounted")
    pub fn mounted_device_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.handles.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids.push(LOCAL_DEVICE_ID);
        ids
    }

    /// Resolve a persisted `(device id, relative path)` pair to an absolute
    /// path
    ///
    /// Never fails: an unmounted device falls back to its last-known mount
    /// point from the catalog, and an id the catalog has never seen falls
    /// back to treating the relative path as already absolute. Both
    /// degradations are logged.
    pub async fn to_absolute(&self, device_id: i64, relative: &Path) -> PathBuf {
        if device_id == LOCAL_DEVICE_ID {
            return normalize(&Path::new("/").join(relative));
        }

        if let Some(mount) = self.mount_path_for(device_id) {
            return normalize(&mount.join(relative));
        }

        match self.catalog.last_mount_point(device_id).await {
            Ok(Some(mount)) => {
                debug!(
                    "device {} not mounted, resolving against last mount point {}",
                    device_id,
                    mount.display()
                );
                normalize(&mount.join(relative))
            }
            Ok(None) => {
                warn!(
                    "device {} unknown to catalog, treating {} as absolute",
                    device_id,
                    relative.display()
                );
                normalize(&Path::new("/").join(relative))
            }
            Err(e) => {
                warn!(
                    "catalog lookup for device {} failed ({}), treating {} as absolute",
                    device_id,
                    e,
                    relative.display()
                );
                normalize(&Path::new("/").join(relative))
            }
        }
    }

    /// Inverse of `to_absolute`: strip the device's mount path
    ///
    /// For the sentinel id or an unmounted device the filesystem root is
    /// the reference point.
    pub fn to_relative(&self, device_id: i64, absolute: &Path) -> PathBuf {
        let absolute = normalize(absolute);

        if device_id != LOCAL_DEVICE_ID {
            if let Some(mount) = self.mount_path_for(device_id) {
                match absolute.strip_prefix(&mount) {
                    Ok(relative) => return relative.to_path_buf(),
                    Err(_) => warn!(
                        "path {} is not under mount point {} of device {}",
                        absolute.display(),
                        mount.display(),
                        device_id
                    ),
                }
            }
        }

        absolute
            .strip_prefix("/")
            .map(Path::to_path_buf)
            .unwrap_or(absolute)
    }

    /// Absolute paths of all configured collection root folders on mounted
    /// devices, de-duplicated
    ///
    /// Falls back to the platform music directory when nothing is
    /// configured, unless that directory is missing or is the home
    /// directory itself.
    pub async fn collection_root_folders(&self) -> Vec<PathBuf> {
        let mut result: Vec<PathBuf> = Vec::new();

        for device_id in self.mounted_device_ids() {
            let entries = match self.catalog.root_folder_entries(device_id).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("cannot read root folders for device {}: {}", device_id, e);
                    continue;
                }
            };

            for entry in entries {
                let absolute = if entry == "./" {
                    match self.mount_path_for(device_id) {
                        Some(mount) => mount,
                        None => continue,
                    }
                } else {
                    self.to_absolute(device_id, Path::new(&entry)).await
                };
                if !result.contains(&absolute) {
                    result.push(absolute);
                }
            }
        }

        if result.is_empty() {
            if let Some(music_dir) = dirs::audio_dir() {
                let is_home = dirs::home_dir().is_some_and(|home| home == music_dir);
                if !is_home && music_dir.exists() {
                    debug!("no root folders configured, using {}", music_dir.display());
                    result.push(music_dir);
                }
            }
        }

        result
    }

    /// Persist a new set of collection root folders
    ///
    /// Each path is attributed to its owning device via longest-prefix
    /// match and stored relative to that device's mount path. Devices that
    /// had folders configured but appear in none of the inputs lose their
    /// entries, so no orphaned configuration survives.
    pub async fn set_collection_root_folders(&self, folders: &[PathBuf]) -> Result<()> {
        let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
        for folder in folders {
            let device_id = self.resolve_device_id(folder);
            let relative = self
                .to_relative(device_id, folder)
                .to_string_lossy()
                .into_owned();
            let entries = grouped.entry(device_id).or_default();
            if !entries.contains(&relative) {
                entries.push(relative);
            }
        }

        for configured in self.catalog.configured_device_ids().await? {
            if !grouped.contains_key(&configured) {
                self.catalog.remove_root_folder_entries(configured).await?;
            }
        }

        for (device_id, entries) in &grouped {
            self.catalog
                .set_root_folder_entries(*device_id, entries)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::device::handler::{VolumeHandlerFactory, STORAGE_VOLUME_KIND};

    fn volume_descriptor(token: &str, uuid: &str, mount: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            token: token.to_string(),
            kind: STORAGE_VOLUME_KIND.to_string(),
            uuid: Some(uuid.to_string()),
            label: None,
            mount_path: Some(PathBuf::from(mount)),
        }
    }

    fn registry_with_volumes() -> (DeviceRegistry, Arc<MemoryCatalog>) {
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = DeviceRegistry::new(Arc::clone(&catalog) as Arc<dyn Catalog>);
        registry.register_factory(Arc::new(VolumeHandlerFactory::new(
            Arc::clone(&catalog) as Arc<dyn Catalog>
        )));
        (registry, catalog)
    }

    #[tokio::test]
    async fn test_longest_prefix_match() {
        let (registry, _) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("t1", "u1", "/media/usb1"))
            .await;
        registry
            .device_attached(&volume_descriptor("t2", "u2", "/media/usb1/sub"))
            .await;

        let outer = registry.resolve_device_id(Path::new("/media/usb1/other.mp3"));
        let inner = registry.resolve_device_id(Path::new("/media/usb1/sub/song.mp3"));

        assert_ne!(outer, inner);
        assert_eq!(
            registry.mount_path_for(inner).unwrap(),
            PathBuf::from("/media/usb1/sub")
        );
        // Nothing matches outside both mounts
        assert_eq!(
            registry.resolve_device_id(Path::new("/home/user/song.mp3")),
            LOCAL_DEVICE_ID
        );
    }

    #[tokio::test]
    async fn test_prefix_match_is_component_wise() {
        let (registry, _) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("t1", "u1", "/media/usb1"))
            .await;

        // "/media/usb10" shares a string prefix with "/media/usb1" but is a
        // different directory
        assert_eq!(
            registry.resolve_device_id(Path::new("/media/usb10/song.mp3")),
            LOCAL_DEVICE_ID
        );
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (registry, _) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("t1", "u1", "/media/usb1"))
            .await;
        let id = registry.resolve_device_id(Path::new("/media/usb1/x"));

        let relative = Path::new("music/./song.mp3");
        let absolute = registry.to_absolute(id, relative).await;
        assert_eq!(absolute, PathBuf::from("/media/usb1/music/song.mp3"));
        assert_eq!(
            registry.to_relative(id, &absolute),
            normalize(relative)
        );
    }

    #[tokio::test]
    async fn test_sentinel_semantics() {
        let (registry, _) = registry_with_volumes();

        let absolute = registry
            .to_absolute(LOCAL_DEVICE_ID, Path::new("/home/user/song.mp3"))
            .await;
        assert_eq!(absolute, PathBuf::from("/home/user/song.mp3"));

        assert!(registry.mounted_device_ids().contains(&LOCAL_DEVICE_ID));
        assert_eq!(
            registry.to_relative(LOCAL_DEVICE_ID, Path::new("/home/user/song.mp3")),
            PathBuf::from("home/user/song.mp3")
        );
    }

    #[tokio::test]
    async fn test_mount_independence_across_remount() {
        let (registry, catalog) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("tok-a", "uuid-1", "/media/usb1"))
            .await;
        let id = registry.resolve_device_id(Path::new("/media/usb1/x"));

        let reference = PathBuf::from("music/song.mp3");
        assert_eq!(
            registry.to_absolute(id, &reference).await,
            PathBuf::from("/media/usb1/music/song.mp3")
        );

        // Detach and re-attach at a different mount point: same id, new
        // absolute path, no persisted data rewritten
        registry.device_detached("tok-a");
        assert!(!registry.is_mounted(id));
        registry
            .device_attached(&volume_descriptor("tok-b", "uuid-1", "/run/media/usb1"))
            .await;

        assert!(registry.is_mounted(id));
        assert_eq!(
            registry.to_absolute(id, &reference).await,
            PathBuf::from("/run/media/usb1/music/song.mp3")
        );
        assert_eq!(
            catalog.last_mount_point(id).await.unwrap(),
            Some(PathBuf::from("/run/media/usb1"))
        );
    }

    #[tokio::test]
    async fn test_attach_replaces_stale_handle() {
        let (registry, _) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("tok-a", "uuid-1", "/media/usb1"))
            .await;
        let id = registry.resolve_device_id(Path::new("/media/usb1/x"));

        // Same volume attaches again without an intervening detach
        registry
            .device_attached(&volume_descriptor("tok-b", "uuid-1", "/mnt/usb1"))
            .await;

        let ids = registry.mounted_device_ids();
        assert_eq!(ids.iter().filter(|&&i| i == id).count(), 1);
        assert_eq!(registry.mount_path_for(id).unwrap(), PathBuf::from("/mnt/usb1"));
        // The stale token no longer matches anything
        registry.device_detached("tok-a");
        assert!(registry.is_mounted(id));
        registry.device_detached("tok-b");
        assert!(!registry.is_mounted(id));
    }

    #[tokio::test]
    async fn test_unmounted_falls_back_to_last_mount_point() {
        let (registry, _) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("tok-a", "uuid-1", "/media/usb1"))
            .await;
        let id = registry.resolve_device_id(Path::new("/media/usb1/x"));
        registry.device_detached("tok-a");

        // Still resolves via the catalog's last-known mount point
        assert_eq!(
            registry.to_absolute(id, Path::new("music/song.mp3")).await,
            PathBuf::from("/media/usb1/music/song.mp3")
        );
    }

    #[tokio::test]
    async fn test_unknown_device_degrades_to_identity() {
        let (registry, _) = registry_with_volumes();
        assert_eq!(
            registry.to_absolute(1234, Path::new("/somewhere/song.mp3")).await,
            PathBuf::from("/somewhere/song.mp3")
        );
    }

    #[tokio::test]
    async fn test_set_collection_root_folders_groups_by_device() {
        let (registry, catalog) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("t1", "u1", "/media/usb1"))
            .await;
        let id = registry.resolve_device_id(Path::new("/media/usb1/x"));

        registry
            .set_collection_root_folders(&[
                PathBuf::from("/media/usb1/music"),
                PathBuf::from("/media/usb1/podcasts"),
                PathBuf::from("/home/user/music"),
            ])
            .await
            .unwrap();

        assert_eq!(
            catalog.root_folder_entries(id).await.unwrap(),
            vec!["music".to_string(), "podcasts".to_string()]
        );
        assert_eq!(
            catalog.root_folder_entries(LOCAL_DEVICE_ID).await.unwrap(),
            vec!["home/user/music".to_string()]
        );

        let folders = registry.collection_root_folders().await;
        assert!(folders.contains(&PathBuf::from("/media/usb1/music")));
        assert!(folders.contains(&PathBuf::from("/media/usb1/podcasts")));
        assert!(folders.contains(&PathBuf::from("/home/user/music")));
        assert_eq!(folders.len(), 3);
    }

    #[tokio::test]
    async fn test_set_collection_root_folders_removes_orphans() {
        let (registry, catalog) = registry_with_volumes();
        registry
            .device_attached(&volume_descriptor("t1", "u1", "/media/usb1"))
            .await;
        let id = registry.resolve_device_id(Path::new("/media/usb1/x"));

        registry
            .set_collection_root_folders(&[PathBuf::from("/media/usb1/music")])
            .await
            .unwrap();
        assert_eq!(catalog.configured_device_ids().await.unwrap(), vec![id]);

        // New configuration no longer references the device
        registry
            .set_collection_root_folders(&[PathBuf::from("/home/user/music")])
            .await
            .unwrap();
        assert_eq!(
            catalog.configured_device_ids().await.unwrap(),
            vec![LOCAL_DEVICE_ID]
        );
        assert!(catalog.root_folder_entries(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attach_detach_events() {
        let (registry, _) = registry_with_volumes();
        let mut rx = registry.subscribe();

        registry
            .device_attached(&volume_descriptor("tok-a", "uuid-1", "/media/usb1"))
            .await;
        let id = registry.resolve_device_id(Path::new("/media/usb1/x"));
        registry.device_detached("tok-a");

        match rx.recv().await.unwrap() {
            DeviceEvent::DeviceAttached {
                device_id,
                mount_path,
            } => {
                assert_eq!(device_id, id);
                assert_eq!(mount_path, PathBuf::from("/media/usb1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            DeviceEvent::DeviceDetached { device_id } => assert_eq!(device_id, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scan_devices_enumerates_present_devices() {
        struct FixedNotifier(Vec<DeviceDescriptor>);
        impl DeviceNotifier for FixedNotifier {
            fn devices_matching(&self, kind: &str) -> Vec<DeviceDescriptor> {
                self.0
                    .iter()
                    .filter(|d| d.kind == kind)
                    .cloned()
                    .collect()
            }
        }

        let (registry, _) = registry_with_volumes();
        let notifier = FixedNotifier(vec![
            volume_descriptor("t1", "u1", "/media/usb1"),
            volume_descriptor("t2", "u2", "/media/usb2"),
        ]);

        registry.scan_devices(&notifier).await;
        // Two live devices plus the sentinel
        assert_eq!(registry.mounted_device_ids().len(), 3);
    }
}
