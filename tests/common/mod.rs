// SPDX-License-Identifier: GPL-3.0-only

//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tether_camera::media::encoders::FrameSequenceFactory;
use tether_camera::{Camera, Config, DeviceLock, VirtualDevice, ui};

/// Unique scratch directory under the system temp dir
pub fn temp_root(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tether-{}-{}", tag, uuid::Uuid::new_v4()))
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Small, fast virtual device
pub fn fast_device() -> VirtualDevice {
    VirtualDevice::new("Virtual EOS")
        .with_frame_size(64, 48)
        .with_frame_interval(Duration::from_millis(2))
}

pub fn test_config(root: &std::path::Path) -> Config {
    Config {
        image_dir: root.join("images"),
        video_dir: root.join("videos"),
        settle_delay_ms: 0,
        routing_wait_ms: 1000,
        ..Config::default()
    }
}

/// Controller on a spawned UI thread
pub struct Harness {
    pub device: VirtualDevice,
    pub camera: Camera,
    pub root: PathBuf,
}

impl Harness {
    pub fn new(device: VirtualDevice) -> Self {
        Self::with_config(device, |_| {})
    }

    pub fn with_config(device: VirtualDevice, adjust: impl FnOnce(&mut Config)) -> Self {
        let root = temp_root("session");
        let mut config = test_config(&root);
        adjust(&mut config);

        let (ui, dispatcher) = ui::channel();
        dispatcher.spawn().expect("spawn UI dispatcher");

        let camera = Camera::builder(DeviceLock::new(device.clone()), ui)
            .config(config)
            .writer_factory(Arc::new(FrameSequenceFactory::default()))
            .build();
        Self {
            device,
            camera,
            root,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.camera.dispose();
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
