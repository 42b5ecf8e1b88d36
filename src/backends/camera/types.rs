// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the device gateway contract

//! Shared types for device gateways

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Result type for raw gateway calls
pub type GatewayResult<T> = Result<T, DeviceStatus>;

/// Status code reported by the device
///
/// Gateways return the raw code of the failed call. Only the codes the
/// controller reacts to or reports by name are listed as constants; every
/// other code is carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceStatus(pub u32);

impl DeviceStatus {
    pub const INTERNAL_ERROR: DeviceStatus = DeviceStatus(0x0000_0002);
    pub const NOT_SUPPORTED: DeviceStatus = DeviceStatus(0x0000_0007);
    pub const PROPERTIES_UNAVAILABLE: DeviceStatus = DeviceStatus(0x0000_0050);
    pub const INVALID_PARAMETER: DeviceStatus = DeviceStatus(0x0000_0060);
    pub const INVALID_HANDLE: DeviceStatus = DeviceStatus(0x0000_0061);
    pub const DEVICE_NOT_FOUND: DeviceStatus = DeviceStatus(0x0000_0080);
    pub const DEVICE_BUSY: DeviceStatus = DeviceStatus(0x0000_0081);
    pub const OBJECT_NOT_READY: DeviceStatus = DeviceStatus(0x0000_a102);

    /// Raw status code
    pub fn code(&self) -> u32 {
        self.0
    }

    /// Symbolic name for well-known codes
    pub fn name(&self) -> &'static str {
        match *self {
            DeviceStatus::INTERNAL_ERROR => "internal error",
            DeviceStatus::NOT_SUPPORTED => "not supported",
            DeviceStatus::PROPERTIES_UNAVAILABLE => "properties unavailable",
            DeviceStatus::INVALID_PARAMETER => "invalid parameter",
            DeviceStatus::INVALID_HANDLE => "invalid handle",
            DeviceStatus::DEVICE_NOT_FOUND => "device not found",
            DeviceStatus::DEVICE_BUSY => "device busy",
            DeviceStatus::OBJECT_NOT_READY => "object not ready",
            _ => "device error",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

/// Opaque handle to an attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Opaque reference to a device-resident file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemRef(pub u64);

/// Token passed back with every notification, identifying the session owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextToken(pub Uuid);

impl ContextToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device properties the controller reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyId {
    ProductName,
    AeMode,
    AeModeSelect,
    EvfOutputDevice,
    SaveTo,
    EvfDepthOfFieldPreview,
    IsoSpeed,
    ImageQuality,
    ExposureCompensation,
    WhiteBalance,
    MeteringMode,
    DriveMode,
    Tv,
}

impl PropertyId {
    /// Every property mirrored by the controller
    pub const MIRRORED: [PropertyId; 11] = [
        PropertyId::AeMode,
        PropertyId::EvfOutputDevice,
        PropertyId::SaveTo,
        PropertyId::EvfDepthOfFieldPreview,
        PropertyId::IsoSpeed,
        PropertyId::ImageQuality,
        PropertyId::ExposureCompensation,
        PropertyId::WhiteBalance,
        PropertyId::MeteringMode,
        PropertyId::DriveMode,
        PropertyId::Tv,
    ];

    /// Wire identifier used by the vendor API
    pub fn code(&self) -> u32 {
        match self {
            PropertyId::ProductName => 0x0000_0002,
            PropertyId::SaveTo => 0x0000_000b,
            PropertyId::ImageQuality => 0x0000_0100,
            PropertyId::WhiteBalance => 0x0000_0106,
            PropertyId::AeMode => 0x0000_0400,
            PropertyId::DriveMode => 0x0000_0401,
            PropertyId::IsoSpeed => 0x0000_0402,
            PropertyId::MeteringMode => 0x0000_0403,
            PropertyId::Tv => 0x0000_0406,
            PropertyId::ExposureCompensation => 0x0000_0407,
            PropertyId::AeModeSelect => 0x0000_0436,
            PropertyId::EvfOutputDevice => 0x0000_0500,
            PropertyId::EvfDepthOfFieldPreview => 0x0000_0504,
        }
    }

    /// Parse a wire identifier
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x0000_0002 => Some(PropertyId::ProductName),
            0x0000_000b => Some(PropertyId::SaveTo),
            0x0000_0100 => Some(PropertyId::ImageQuality),
            0x0000_0106 => Some(PropertyId::WhiteBalance),
            0x0000_0400 => Some(PropertyId::AeMode),
            0x0000_0401 => Some(PropertyId::DriveMode),
            0x0000_0402 => Some(PropertyId::IsoSpeed),
            0x0000_0403 => Some(PropertyId::MeteringMode),
            0x0000_0406 => Some(PropertyId::Tv),
            0x0000_0407 => Some(PropertyId::ExposureCompensation),
            0x0000_0436 => Some(PropertyId::AeModeSelect),
            0x0000_0500 => Some(PropertyId::EvfOutputDevice),
            0x0000_0504 => Some(PropertyId::EvfDepthOfFieldPreview),
            _ => None,
        }
    }

    /// Whether the device publishes a list of allowed values for this property
    pub fn is_enumerated(&self) -> bool {
        matches!(
            self,
            PropertyId::IsoSpeed
                | PropertyId::ImageQuality
                | PropertyId::ExposureCompensation
                | PropertyId::WhiteBalance
                | PropertyId::MeteringMode
                | PropertyId::DriveMode
                | PropertyId::Tv
        )
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:04X})", self, self.code())
    }
}

/// Property value as read from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    UInt32(u32),
    Text(String),
}

impl PropertyValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropertyValue::UInt32(v) => Some(*v),
            PropertyValue::Text(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::UInt32(_) => None,
        }
    }
}

/// Live-view output routing bits
pub mod evf_output {
    /// Device screen
    pub const TFT: u32 = 1;
    /// Host computer
    pub const PC: u32 = 2;
}

/// Save destination values
pub mod save_to {
    pub const CAMERA: u32 = 1;
    pub const HOST: u32 = 2;
    pub const BOTH: u32 = 3;
}

/// Depth-of-field preview values
pub mod dof_preview {
    pub const OFF: u32 = 0;
    pub const ON: u32 = 1;
}

/// Shutter button positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutterButton {
    Off,
    Halfway,
    Completely,
}

impl ShutterButton {
    pub fn code(&self) -> i32 {
        match self {
            ShutterButton::Off => 0,
            ShutterButton::Halfway => 1,
            ShutterButton::Completely => 3,
        }
    }
}

/// Commands sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    /// Single-step capture
    TakePicture,
    /// Move the shutter button to a position
    PressShutter(ShutterButton),
    /// Lock the device UI (required around capacity reporting)
    UiLock,
    /// Unlock the device UI
    UiUnlock,
}

/// Free space the host reports to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapacity {
    pub free_clusters: i32,
    pub bytes_per_sector: i32,
    pub reset: bool,
}

/// Metadata of a device-resident file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub name: String,
    pub size: u64,
}

/// Object notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEvent {
    /// A file is waiting for the host to transfer it
    DirItemRequestTransfer,
    /// A file was created on the device
    DirItemCreated,
    /// A file's content changed
    DirItemContentChanged,
    Other(u32),
}

/// Property notification kinds, carrying the wire property identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyEvent {
    ValueChanged(u32),
    AllowedValuesChanged(u32),
}

/// Device state notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// The device closed the session (cable pulled, powered off)
    Shutdown,
    WillSoonShutdown,
    Other(u32),
}

/// Called when a device is attached
pub type AttachHandler = Arc<dyn Fn(ContextToken) + Send + Sync>;

/// Called for object (file) notifications
pub type ObjectEventHandler = Arc<dyn Fn(ObjectEvent, ItemRef, ContextToken) + Send + Sync>;

/// Called for property notifications
pub type PropertyEventHandler = Arc<dyn Fn(PropertyEvent, ContextToken) + Send + Sync>;

/// Called for device state notifications
pub type StateEventHandler = Arc<dyn Fn(StateEvent, ContextToken) + Send + Sync>;
