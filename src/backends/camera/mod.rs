// SPDX-License-Identifier: GPL-3.0-only
// Device gateway abstraction over the vendor camera API

//! Camera backend abstraction
//!
//! The controller never talks to the vendor library directly. Everything goes
//! through the [`DeviceGateway`] trait, and every call is serialized by the
//! process-wide [`DeviceLock`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Camera controller  │  ← Session state machine, capture, transfer
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │     DeviceLock      │  ← One device call at a time
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ DeviceGateway Trait │  ← Vendor API contract
//! └──────────┬──────────┘
//!            │
//!            ▼
//!    ┌───────────────┐
//!    │ VirtualDevice │  ← In-process device (tests, demo)
//!    └───────────────┘
//! ```

pub mod frame_loop;
pub mod lock;
pub mod properties;
pub mod types;

pub use frame_loop::{CaptureLoopController, LoopAction};
pub use lock::DeviceLock;
pub use properties::CameraPropertySet;
pub use types::*;

use std::io::Write;

/// Contract of the vendor camera API
///
/// Methods map one-to-one onto vendor calls and report the raw device status
/// on failure. Notification handlers may be invoked on any thread, but never
/// while the gateway is inside one of its own calls.
pub trait DeviceGateway: Send {
    // ===== Sessions =====

    /// Locate the first attached device
    fn find_first_device(&mut self) -> GatewayResult<DeviceHandle>;

    /// Open a session on a located device
    fn open_session(&mut self, handle: DeviceHandle) -> GatewayResult<()>;

    /// Close an open session
    fn close_session(&mut self, handle: DeviceHandle) -> GatewayResult<()>;

    /// Release a device handle
    fn release_device(&mut self, handle: DeviceHandle);

    // ===== Properties =====

    /// Read a property value
    fn get_property(&mut self, handle: DeviceHandle, id: PropertyId)
    -> GatewayResult<PropertyValue>;

    /// Write a 32-bit property value
    fn set_property(&mut self, handle: DeviceHandle, id: PropertyId, value: u32)
    -> GatewayResult<()>;

    /// Read the list of values the device currently accepts for a property
    fn get_allowed_values(&mut self, handle: DeviceHandle, id: PropertyId)
    -> GatewayResult<Vec<u32>>;

    // ===== Commands =====

    /// Send a device command
    fn send_command(&mut self, handle: DeviceHandle, command: DeviceCommand) -> GatewayResult<()>;

    /// Report host free space to the device
    fn set_capacity(&mut self, handle: DeviceHandle, capacity: HostCapacity) -> GatewayResult<()>;

    // ===== Live view =====

    /// Download the current live-view image into `buffer`
    ///
    /// Returns the number of encoded bytes written. Fails if the device has no
    /// image ready or the image does not fit.
    fn download_live_view(&mut self, handle: DeviceHandle, buffer: &mut [u8])
    -> GatewayResult<usize>;

    // ===== Files =====

    /// Read the name and size of a device-resident file
    fn item_info(&mut self, item: ItemRef) -> GatewayResult<ItemInfo>;

    /// Stream a device-resident file into `dest`
    fn download_item(&mut self, item: ItemRef, size: u64, dest: &mut dyn Write)
    -> GatewayResult<()>;

    /// Tell the device a download finished
    fn complete_download(&mut self, item: ItemRef) -> GatewayResult<()>;

    /// Delete a device-resident file
    fn delete_item(&mut self, item: ItemRef) -> GatewayResult<()>;

    /// Release a file reference received with an object notification
    fn release_item(&mut self, item: ItemRef);

    // ===== Notifications =====

    /// Register (or clear) the process-wide device-attached handler
    fn set_attach_handler(&mut self, handler: Option<AttachHandler>, token: ContextToken)
    -> GatewayResult<()>;

    /// Register the object notification handler for a device
    fn set_object_handler(
        &mut self,
        handle: DeviceHandle,
        handler: ObjectEventHandler,
        token: ContextToken,
    ) -> GatewayResult<()>;

    /// Register the property notification handler for a device
    fn set_property_handler(
        &mut self,
        handle: DeviceHandle,
        handler: PropertyEventHandler,
        token: ContextToken,
    ) -> GatewayResult<()>;

    /// Register the state notification handler for a device
    fn set_state_handler(
        &mut self,
        handle: DeviceHandle,
        handler: StateEventHandler,
        token: ContextToken,
    ) -> GatewayResult<()>;
}
