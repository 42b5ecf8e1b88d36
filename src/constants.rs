// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for one live-view transfer buffer (2 MiB)
pub const MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;

/// Output frame rate of recorded video
pub const RECORDING_FPS: u32 = 16;

/// Delay after opening a session before the device accepts the next command
pub const SESSION_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How long the capture loop waits for live-view routing to reach the host
pub const ROUTING_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for routing
pub const ROUTING_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default folder name created under the pictures/videos directories
pub const DEFAULT_SAVE_FOLDER: &str = "Camera";

/// Case-insensitive file name prefix the device uses for still images
pub const IMAGE_NAME_PREFIX: &str = "img";

/// Desired device defaults pushed during session initialization
pub mod defaults {
    /// ISO speed: auto
    pub const ISO_SPEED: u32 = 0;
    /// Exposure compensation: +3 stops encoding used by the device
    pub const EXPOSURE_COMPENSATION: u32 = 0x18;
    /// White balance: auto (ambience priority)
    pub const WHITE_BALANCE: u32 = 0;
    /// Metering mode: spot
    pub const METERING_MODE: u32 = 0;
    /// Drive mode: single shot
    pub const DRIVE_MODE: u32 = 0;
    /// Shutter speed (Tv code)
    pub const SHUTTER_SPEED: u32 = 0x60;
}

/// Host capacity reported to the device when saving to host
pub mod host_capacity {
    pub const FREE_CLUSTERS: i32 = 0x7FFF_FFFF;
    pub const BYTES_PER_SECTOR: i32 = 0x1000;
}

/// Image quality codes that produce JPEG-only output
pub const JPEG_ONLY_QUALITIES: [u32; 14] = [
    0x0010_ff0f, // large
    0x0510_ff0f, // middle 1
    0x0610_ff0f, // middle 2
    0x0210_ff0f, // small
    0x0013_ff0f, // large fine
    0x0012_ff0f, // large normal
    0x0113_ff0f, // middle fine
    0x0112_ff0f, // middle normal
    0x0213_ff0f, // small fine
    0x0212_ff0f, // small normal
    0x0e13_ff0f, // small 1 fine
    0x0e12_ff0f, // small 1 normal
    0x0f13_ff0f, // small 2 fine
    0x1013_ff0f, // small 3 fine
];

/// Frame pacing policy for recorded video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FramePacing {
    /// Write a frame only when the wall-clock frame index advances
    #[default]
    Drop,
    /// Repeat the current frame for every frame index that was skipped
    Fill,
}

/// Device command sequence used to stop live view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopSequence {
    /// Turn depth-of-field preview off (when active), then clear host routing
    #[default]
    DisableDofPreviewThenRouting,
    /// Only clear host routing
    RoutingOnly,
}

/// Device command sequence used to take a picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShutterSequence {
    /// Press the shutter button completely, then release it
    #[default]
    PressRelease,
    /// Single take-picture command
    TakePicture,
}
