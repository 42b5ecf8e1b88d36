// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera controller

use crate::backends::camera::types::DeviceStatus;
use std::fmt;
use std::path::PathBuf;

/// Result type alias for public controller operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Errors reported by public controller operations
///
/// The `Display` form is the human-readable message handed to callers. Device
/// errors always name the failed step and the device-reported status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// No device was found while opening a session
    DeviceNotFound(DeviceStatus),
    /// Operation needs an open session but none exists
    NotConnected,
    /// A device call failed (busy, property rejected, command refused)
    Device {
        step: &'static str,
        status: DeviceStatus,
    },
    /// Recording sink failure
    Recording(RecordingError),
    /// The UI-affinity context is no longer running
    UiUnavailable,
}

/// Recording sink errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// Destination directory could not be created
    CreateDir { path: PathBuf, message: String },
    /// Output file could not be opened
    Open { path: PathBuf, message: String },
    /// A frame could not be written
    Write { index: u64, message: String },
    /// Output file could not be finalized
    Finalize { path: PathBuf, message: String },
}

/// Errors while ingesting a single device file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// A device call failed during the transfer
    Device {
        step: &'static str,
        status: DeviceStatus,
    },
    /// Host filesystem failure
    Io { path: PathBuf, message: String },
}

/// Configuration file errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read or written
    Io { path: PathBuf, message: String },
    /// File contents are not valid configuration
    Parse { path: PathBuf, message: String },
}

impl CameraError {
    /// Build a device error for a failed step
    pub fn device(step: &'static str, status: DeviceStatus) -> Self {
        CameraError::Device { step, status }
    }

    /// Device status code carried by this error, if any
    pub fn status(&self) -> Option<DeviceStatus> {
        match self {
            CameraError::DeviceNotFound(status) => Some(*status),
            CameraError::Device { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::DeviceNotFound(status) => write!(f, "No camera detected ({})", status),
            CameraError::NotConnected => write!(f, "No camera connected"),
            CameraError::Device { step, status } => write!(f, "Failed to {}: {}", step, status),
            CameraError::Recording(e) => write!(f, "Recording error: {}", e),
            CameraError::UiUnavailable => write!(f, "UI context is not running"),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::CreateDir { path, message } => {
                write!(f, "Failed to create {}: {}", path.display(), message)
            }
            RecordingError::Open { path, message } => {
                write!(f, "Failed to open {}: {}", path.display(), message)
            }
            RecordingError::Write { index, message } => {
                write!(f, "Failed to write frame {}: {}", index, message)
            }
            RecordingError::Finalize { path, message } => {
                write!(f, "Failed to finalize {}: {}", path.display(), message)
            }
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Device { step, status } => write!(f, "Failed to {}: {}", step, status),
            TransferError::Io { path, message } => {
                write!(f, "I/O error on {}: {}", path.display(), message)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => {
                write!(f, "Failed to access config {}: {}", path.display(), message)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "Invalid config {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for CameraError {}
impl std::error::Error for RecordingError {}
impl std::error::Error for TransferError {}
impl std::error::Error for ConfigError {}

impl From<RecordingError> for CameraError {
    fn from(err: RecordingError) -> Self {
        CameraError::Recording(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_names_step_and_status() {
        let err = CameraError::device("start live view", DeviceStatus::DEVICE_BUSY);
        let msg = err.to_string();
        assert!(msg.contains("start live view"));
        assert!(msg.contains("0x00000081"));
        assert_eq!(err.status(), Some(DeviceStatus::DEVICE_BUSY));
    }

    #[test]
    fn test_not_found_carries_status() {
        let err = CameraError::DeviceNotFound(DeviceStatus::DEVICE_NOT_FOUND);
        assert!(err.to_string().starts_with("No camera detected"));
        assert_eq!(err.status(), Some(DeviceStatus::DEVICE_NOT_FOUND));
        assert_eq!(CameraError::NotConnected.status(), None);
    }
}
