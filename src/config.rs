// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{
    FramePacing, MAX_FRAME_BYTES, RECORDING_FPS, ROUTING_WAIT_TIMEOUT, SESSION_SETTLE_DELAY,
    ShutterSequence, StopSequence,
};
use crate::errors::ConfigError;
use crate::storage::{OutputLocations, default_image_dir, default_video_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Controller configuration
///
/// Missing fields in a loaded file take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for transferred still images
    pub image_dir: PathBuf,
    /// Directory for recordings and transferred clips
    pub video_dir: PathBuf,
    /// Output frame rate of recordings
    pub output_fps: u32,
    /// How recordings hold their output rate
    pub pacing: FramePacing,
    /// Wait after opening a session before the next device command
    pub settle_delay_ms: u64,
    /// How long a new capture loop waits for routing to reach the host
    pub routing_wait_ms: u64,
    /// Size of the live-view transfer buffer
    pub max_frame_bytes: usize,
    /// Device commands used to stop live view
    pub stop_sequence: StopSequence,
    /// Device commands used to take a picture
    pub shutter_sequence: ShutterSequence,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            video_dir: default_video_dir(),
            output_fps: RECORDING_FPS,
            pacing: FramePacing::default(),
            settle_delay_ms: SESSION_SETTLE_DELAY.as_millis() as u64,
            routing_wait_ms: ROUTING_WAIT_TIMEOUT.as_millis() as u64,
            max_frame_bytes: MAX_FRAME_BYTES,
            stop_sequence: StopSequence::default(),
            shutter_sequence: ShutterSequence::default(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Config = serde_json::from_slice(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(config.sanitized())
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    /// Replace values the controller cannot run with by their defaults
    fn sanitized(mut self) -> Self {
        if self.output_fps == 0 {
            self.output_fps = RECORDING_FPS;
        }
        if self.max_frame_bytes == 0 {
            self.max_frame_bytes = MAX_FRAME_BYTES;
        }
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn routing_wait(&self) -> Duration {
        Duration::from_millis(self.routing_wait_ms)
    }

    /// Initial output locations (no naming rule)
    pub fn output_locations(&self) -> OutputLocations {
        OutputLocations::new(self.image_dir.clone(), self.video_dir.clone())
    }
}
