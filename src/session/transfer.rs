// SPDX-License-Identifier: GPL-3.0-only

//! Transfer ingestor
//!
//! Copies device-resident files to host storage when the device announces
//! them. The whole transfer of one item runs under the device lock. A failure
//! drops that item only; the capture loop and the session are unaffected.

use super::events::EventHub;
use crate::backends::camera::{DeviceLock, ItemRef, ObjectEvent};
use crate::errors::TransferError;
use crate::storage::{AssetKind, SharedLocations, resolve_output_path, split_device_name};
use crate::ui::UiContext;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A file written to host storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedAsset {
    pub kind: AssetKind,
    pub path: PathBuf,
}

/// Reacts to object notifications by downloading the announced file
#[derive(Clone)]
pub struct TransferIngestor {
    gateway: DeviceLock,
    locations: SharedLocations,
    events: Arc<EventHub>,
    ui: UiContext,
}

impl TransferIngestor {
    pub fn new(
        gateway: DeviceLock,
        locations: SharedLocations,
        events: Arc<EventHub>,
        ui: UiContext,
    ) -> Self {
        Self {
            gateway,
            locations,
            events,
            ui,
        }
    }

    /// Handle one object notification
    ///
    /// Transfer requests and newly created items are ingested; other events
    /// are ignored. The item reference is released in every case.
    pub fn handle_object_event(&self, event: ObjectEvent, item: ItemRef) -> Option<IngestedAsset> {
        let delete_after = match event {
            ObjectEvent::DirItemRequestTransfer => false,
            ObjectEvent::DirItemCreated => true,
            other => {
                debug!(event = ?other, "Ignoring object event");
                self.gateway.with(|gw| gw.release_item(item));
                return None;
            }
        };

        let result = self.ingest(item, delete_after);
        self.gateway.with(|gw| gw.release_item(item));

        match result {
            Ok(asset) => {
                info!(path = %asset.path.display(), kind = ?asset.kind, "Transferred file from device");
                self.announce(&asset);
                Some(asset)
            }
            Err(e) => {
                warn!(item = item.0, error = %e, "File transfer failed, item dropped");
                None
            }
        }
    }

    fn ingest(&self, item: ItemRef, delete_after: bool) -> Result<IngestedAsset, TransferError> {
        let locations = self.locations.snapshot();

        self.gateway.with(|gw| {
            let info = gw.item_info(item).map_err(|status| TransferError::Device {
                step: "read item info",
                status,
            })?;

            let kind = AssetKind::classify(&info.name);
            let dir = locations.dir_for(kind);
            let (stem, extension) = split_device_name(&info.name);
            let path = resolve_output_path(dir, locations.naming.as_ref(), stem, &extension)
                .map_err(|e| TransferError::Io {
                    path: dir.to_path_buf(),
                    message: e.to_string(),
                })?;

            let file = File::create(&path).map_err(|e| TransferError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let mut writer = BufWriter::new(file);

            let written = gw
                .download_item(item, info.size, &mut writer)
                .map_err(|status| TransferError::Device {
                    step: "download item",
                    status,
                })
                .and_then(|()| {
                    writer.flush().map_err(|e| TransferError::Io {
                        path: path.clone(),
                        message: e.to_string(),
                    })
                })
                .and_then(|()| {
                    gw.complete_download(item).map_err(|status| TransferError::Device {
                        step: "complete download",
                        status,
                    })
                });
            drop(writer);

            if let Err(e) = written {
                remove_partial(&path);
                return Err(e);
            }

            if delete_after && let Err(status) = gw.delete_item(item) {
                // The host copy is complete; the device keeps its own
                warn!(item = item.0, status = %status, "Failed to delete file from device");
            }

            Ok(IngestedAsset { kind, path })
        })
    }

    fn announce(&self, asset: &IngestedAsset) {
        let events = Arc::clone(&self.events);
        let asset = asset.clone();
        self.ui.post(move || match asset.kind {
            AssetKind::Image => events.emit_new_image(&asset.path),
            AssetKind::Video => events.emit_new_video(&asset.path),
        });
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Could not remove partial file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::VirtualDevice;
    use crate::storage::OutputLocations;
    use crate::ui;

    struct Fixture {
        device: VirtualDevice,
        ingestor: TransferIngestor,
        root: PathBuf,
        _dispatcher: ui::UiDispatcher,
    }

    fn fixture() -> Fixture {
        let root = std::env::temp_dir().join(format!("tether-transfer-{}", uuid::Uuid::new_v4()));
        let device = VirtualDevice::default();
        let locations = SharedLocations::new(OutputLocations::new(
            root.join("images"),
            root.join("videos"),
        ));
        let (ui, dispatcher) = ui::channel();
        let ingestor = TransferIngestor::new(
            DeviceLock::new(device.clone()),
            locations,
            Arc::new(EventHub::new()),
            ui,
        );
        Fixture {
            device,
            ingestor,
            root,
            _dispatcher: dispatcher,
        }
    }

    #[test]
    fn test_request_transfer_keeps_device_copy() {
        let f = fixture();
        let item = f.device.add_item("IMG_0007.JPG", vec![1, 2, 3]);

        let asset = f
            .ingestor
            .handle_object_event(ObjectEvent::DirItemRequestTransfer, item)
            .unwrap();

        assert_eq!(asset.kind, AssetKind::Image);
        assert_eq!(asset.path, f.root.join("images").join("IMG_0007.jpg"));
        assert_eq!(std::fs::read(&asset.path).unwrap(), vec![1, 2, 3]);
        assert!(f.device.item_exists(item));
        assert_eq!(f.device.released_items(), vec![item]);
        let _ = std::fs::remove_dir_all(&f.root);
    }

    #[test]
    fn test_created_item_deleted_after_transfer() {
        let f = fixture();
        let item = f.device.add_item("MVI_0001.MOV", vec![9; 64]);

        let asset = f
            .ingestor
            .handle_object_event(ObjectEvent::DirItemCreated, item)
            .unwrap();

        assert_eq!(asset.kind, AssetKind::Video);
        assert_eq!(asset.path, f.root.join("videos").join("MVI_0001.mov"));
        assert_eq!(f.device.deleted_items(), vec![item]);
        let _ = std::fs::remove_dir_all(&f.root);
    }

    #[test]
    fn test_failed_download_leaves_nothing() {
        let f = fixture();
        let item = f.device.add_item("IMG_0002.JPG", vec![5; 16]);
        f.device.fail_download(item);

        assert!(f
            .ingestor
            .handle_object_event(ObjectEvent::DirItemCreated, item)
            .is_none());

        assert!(!f.root.join("images").join("IMG_0002.jpg").exists());
        assert!(f.device.item_exists(item));
        assert_eq!(f.device.released_items(), vec![item]);
        let _ = std::fs::remove_dir_all(&f.root);
    }

    #[test]
    fn test_content_changed_ignored_but_released() {
        let f = fixture();
        let item = f.device.add_item("IMG_0003.JPG", vec![1]);

        assert!(f
            .ingestor
            .handle_object_event(ObjectEvent::DirItemContentChanged, item)
            .is_none());
        assert_eq!(f.device.released_items(), vec![item]);
        assert!(!f.root.exists());
    }
}
