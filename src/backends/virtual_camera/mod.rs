// SPDX-License-Identifier: GPL-3.0-only

//! Virtual tethered camera
//!
//! [`VirtualDevice`] implements [`DeviceGateway`] entirely in process. It
//! streams a moving test pattern as live view, keeps a property table, stores
//! captured pictures as device-resident items and raises the same
//! notifications a real device would.
//!
//! Clones share one device. The gateway side lives inside the controller's
//! device lock; the cloned handle kept by a test or the CLI scripts behavior
//! and fires notifications.
//!
//! # Notifications
//!
//! Device-side changes made during a gateway call (property writes, a shutter
//! press creating a picture) are queued and delivered by
//! [`VirtualDevice::pump_events`] or by an [`EventPump`] thread, never from
//! inside the call itself. The `fire_*` methods deliver immediately on the
//! calling thread.

mod frames;

pub use frames::test_pattern_jpeg;

use crate::backends::camera::types::*;
use crate::backends::camera::DeviceGateway;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    FindFirstDevice,
    OpenSession,
    CloseSession,
    ReleaseDevice,
    GetProperty(PropertyId),
    SetProperty(PropertyId, u32),
    GetAllowedValues(PropertyId),
    SendCommand(DeviceCommand),
    SetCapacity(HostCapacity),
    DownloadLiveView,
    ItemInfo(ItemRef),
    DownloadItem(ItemRef),
    CompleteDownload(ItemRef),
    DeleteItem(ItemRef),
    ReleaseItem(ItemRef),
    SetAttachHandler { registered: bool },
    SetObjectHandler,
    SetPropertyHandler,
    SetStateHandler,
}

#[derive(Debug, Clone)]
struct VirtualItem {
    name: String,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum PendingEvent {
    Object(ObjectEvent, ItemRef),
    Property(PropertyEvent),
    State(StateEvent),
}

type Registered<H> = Option<(H, ContextToken)>;

struct VirtualState {
    name: String,
    connected: bool,
    next_handle: u64,
    handle: Option<DeviceHandle>,
    session_open: bool,

    properties: HashMap<PropertyId, u32>,
    allowed: HashMap<PropertyId, Vec<u32>>,
    notify_property_changes: bool,

    open_failure: Option<DeviceStatus>,
    property_failures: HashMap<PropertyId, DeviceStatus>,
    command_failures: HashMap<DeviceCommand, DeviceStatus>,
    download_failures: HashSet<ItemRef>,

    frame_size: (u32, u32),
    frame_interval: Duration,
    frame_sequence: u64,
    live_view_failures: u32,
    corrupt_frames: u32,
    frames_served: u64,

    items: HashMap<ItemRef, VirtualItem>,
    next_item: u64,
    deleted: Vec<ItemRef>,
    released: Vec<ItemRef>,
    shots: u32,
    shutter_down: bool,

    calls: Vec<GatewayCall>,
    attach_handler: Registered<AttachHandler>,
    object_handler: Registered<ObjectEventHandler>,
    property_handler: Registered<PropertyEventHandler>,
    state_handler: Registered<StateEventHandler>,
    pending: VecDeque<PendingEvent>,
}

impl VirtualState {
    fn new(name: &str) -> Self {
        let properties = HashMap::from([
            (PropertyId::AeMode, 3),
            (PropertyId::EvfOutputDevice, evf_output::TFT),
            (PropertyId::SaveTo, save_to::CAMERA),
            (PropertyId::EvfDepthOfFieldPreview, dof_preview::OFF),
            (PropertyId::IsoSpeed, 0x48),
            (PropertyId::ImageQuality, 0x0013_0013),
            (PropertyId::ExposureCompensation, 0x00),
            (PropertyId::WhiteBalance, 1),
            (PropertyId::MeteringMode, 3),
            (PropertyId::DriveMode, 0),
            (PropertyId::Tv, 0x60),
        ]);
        let allowed = HashMap::from([
            (PropertyId::IsoSpeed, vec![0x00, 0x48, 0x50, 0x58, 0x60]),
            (
                PropertyId::ImageQuality,
                vec![0x0013_0013, 0x0013_ff0f, 0x0012_ff0f, 0x0113_ff0f],
            ),
            (PropertyId::ExposureCompensation, vec![0x00, 0x08, 0x10, 0x18]),
            (PropertyId::WhiteBalance, vec![0, 1, 2, 3]),
            (PropertyId::MeteringMode, vec![0, 1, 3, 4]),
            (PropertyId::DriveMode, vec![0, 1]),
            (PropertyId::Tv, vec![0x48, 0x50, 0x58, 0x60, 0x68]),
        ]);

        Self {
            name: name.to_string(),
            connected: true,
            next_handle: 1,
            handle: None,
            session_open: false,
            properties,
            allowed,
            notify_property_changes: true,
            open_failure: None,
            property_failures: HashMap::new(),
            command_failures: HashMap::new(),
            download_failures: HashSet::new(),
            frame_size: (320, 240),
            frame_interval: Duration::from_millis(5),
            frame_sequence: 0,
            live_view_failures: 0,
            corrupt_frames: 0,
            frames_served: 0,
            items: HashMap::new(),
            next_item: 1,
            deleted: Vec::new(),
            released: Vec::new(),
            shots: 0,
            shutter_down: false,
            calls: Vec::new(),
            attach_handler: None,
            object_handler: None,
            property_handler: None,
            state_handler: None,
            pending: VecDeque::new(),
        }
    }

    fn check_session(&self, handle: DeviceHandle) -> GatewayResult<()> {
        if self.session_open && self.handle == Some(handle) {
            Ok(())
        } else {
            Err(DeviceStatus::INVALID_HANDLE)
        }
    }

    fn add_item(&mut self, name: &str, data: Vec<u8>) -> ItemRef {
        let item = ItemRef(self.next_item);
        self.next_item += 1;
        self.items.insert(
            item,
            VirtualItem {
                name: name.to_string(),
                data,
            },
        );
        item
    }
}

/// Simulated tethered camera
#[derive(Clone)]
pub struct VirtualDevice {
    state: Arc<Mutex<VirtualState>>,
    active_calls: Arc<AtomicUsize>,
    max_active_calls: Arc<AtomicUsize>,
}

/// Tracks overlapping gateway calls
struct CallGuard<'a> {
    active: &'a AtomicUsize,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new("Virtual EOS")
    }
}

impl VirtualDevice {
    pub fn new(name: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState::new(name))),
            active_calls: Arc::new(AtomicUsize::new(0)),
            max_active_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter a gateway call, recording it in the call log
    fn enter(&self, call: GatewayCall) -> CallGuard<'_> {
        let active = self.active_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_calls.fetch_max(active, Ordering::SeqCst);
        self.lock().calls.push(call);
        CallGuard {
            active: &self.active_calls,
        }
    }

    // ===== Scripting =====

    /// Start without a device attached
    pub fn detached(self) -> Self {
        self.lock().connected = false;
        self
    }

    pub fn with_frame_size(self, width: u32, height: u32) -> Self {
        self.set_frame_size(width, height);
        self
    }

    pub fn with_frame_interval(self, interval: Duration) -> Self {
        self.lock().frame_interval = interval;
        self
    }

    /// Change the size of subsequent live-view images
    pub fn set_frame_size(&self, width: u32, height: u32) {
        self.lock().frame_size = (width.max(1), height.max(1));
    }

    /// Set a property value on the device side without a notification
    pub fn set_device_property(&self, id: PropertyId, value: u32) {
        self.lock().properties.insert(id, value);
    }

    pub fn set_allowed_values(&self, id: PropertyId, values: Vec<u32>) {
        self.lock().allowed.insert(id, values);
    }

    /// Whether property writes queue value-changed notifications
    pub fn set_notify_property_changes(&self, notify: bool) {
        self.lock().notify_property_changes = notify;
    }

    /// Make the next session open fail
    pub fn fail_open_session(&self, status: DeviceStatus) {
        self.lock().open_failure = Some(status);
    }

    /// Make writes of `id` fail until cleared
    pub fn fail_property(&self, id: PropertyId, status: Option<DeviceStatus>) {
        let mut state = self.lock();
        match status {
            Some(status) => state.property_failures.insert(id, status),
            None => state.property_failures.remove(&id),
        };
    }

    /// Make `command` fail until cleared
    pub fn fail_command(&self, command: DeviceCommand, status: Option<DeviceStatus>) {
        let mut state = self.lock();
        match status {
            Some(status) => state.command_failures.insert(command, status),
            None => state.command_failures.remove(&command),
        };
    }

    /// Make the next `count` live-view downloads report busy
    pub fn fail_live_view(&self, count: u32) {
        self.lock().live_view_failures = count;
    }

    /// Make the next `count` live-view downloads return undecodable bytes
    pub fn corrupt_live_view(&self, count: u32) {
        self.lock().corrupt_frames = count;
    }

    /// Make downloads of `item` fail
    pub fn fail_download(&self, item: ItemRef) {
        self.lock().download_failures.insert(item);
    }

    /// Store a file on the device
    pub fn add_item(&self, name: &str, data: Vec<u8>) -> ItemRef {
        self.lock().add_item(name, data)
    }

    // ===== Inspection =====

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of writes of `id`, successful or not
    pub fn property_writes(&self, id: PropertyId) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, GatewayCall::SetProperty(p, _) if *p == id))
            .count()
    }

    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::SendCommand(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn device_property(&self, id: PropertyId) -> Option<u32> {
        self.lock().properties.get(&id).copied()
    }

    pub fn is_session_open(&self) -> bool {
        self.lock().session_open
    }

    pub fn has_attach_handler(&self) -> bool {
        self.lock().attach_handler.is_some()
    }

    pub fn frames_served(&self) -> u64 {
        self.lock().frames_served
    }

    /// Highest number of gateway calls that were ever in progress at once
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active_calls.load(Ordering::SeqCst)
    }

    pub fn item_exists(&self, item: ItemRef) -> bool {
        self.lock().items.contains_key(&item)
    }

    pub fn deleted_items(&self) -> Vec<ItemRef> {
        self.lock().deleted.clone()
    }

    pub fn released_items(&self) -> Vec<ItemRef> {
        self.lock().released.clone()
    }

    // ===== Notifications =====

    /// Plug the device in and raise the attach notification
    pub fn attach(&self) {
        let handler = {
            let mut state = self.lock();
            state.connected = true;
            state.attach_handler.clone()
        };
        info!("Virtual device attached");
        if let Some((handler, token)) = handler {
            handler(token);
        }
    }

    /// Unplug the device and raise the shutdown notification
    pub fn disconnect(&self) {
        {
            let mut state = self.lock();
            state.connected = false;
            state.session_open = false;
            state.handle = None;
            state.pending.clear();
            if let Some(output) = state.properties.get_mut(&PropertyId::EvfOutputDevice) {
                *output &= !evf_output::PC;
            }
        }
        info!("Virtual device disconnected");
        self.fire_state_event(StateEvent::Shutdown);
    }

    pub fn fire_object_event(&self, event: ObjectEvent, item: ItemRef) {
        let handler = self.lock().object_handler.clone();
        if let Some((handler, token)) = handler {
            handler(event, item, token);
        }
    }

    pub fn fire_property_event(&self, event: PropertyEvent) {
        let handler = self.lock().property_handler.clone();
        if let Some((handler, token)) = handler {
            handler(event, token);
        }
    }

    pub fn fire_state_event(&self, event: StateEvent) {
        let handler = self.lock().state_handler.clone();
        if let Some((handler, token)) = handler {
            handler(event, token);
        }
    }

    /// Deliver queued notifications on the calling thread
    ///
    /// Returns the number delivered.
    pub fn pump_events(&self) -> usize {
        let pending: Vec<PendingEvent> = self.lock().pending.drain(..).collect();
        for event in &pending {
            match *event {
                PendingEvent::Object(event, item) => self.fire_object_event(event, item),
                PendingEvent::Property(event) => self.fire_property_event(event),
                PendingEvent::State(event) => self.fire_state_event(event),
            }
        }
        pending.len()
    }

    /// Deliver queued notifications from a background thread
    pub fn start_event_pump(&self, interval: Duration) -> std::io::Result<EventPump> {
        let device = self.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("virtual-device-events".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    device.pump_events();
                    thread::sleep(interval);
                }
            })?;
        Ok(EventPump {
            stop,
            handle: Some(handle),
        })
    }
}

/// Background notification delivery; stops when dropped
pub struct EventPump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Virtual device event pump panicked");
        }
    }
}

impl DeviceGateway for VirtualDevice {
    fn find_first_device(&mut self) -> GatewayResult<DeviceHandle> {
        let _call = self.enter(GatewayCall::FindFirstDevice);
        let mut state = self.lock();
        if !state.connected {
            return Err(DeviceStatus::DEVICE_NOT_FOUND);
        }
        let handle = DeviceHandle(state.next_handle);
        state.next_handle += 1;
        state.handle = Some(handle);
        Ok(handle)
    }

    fn open_session(&mut self, handle: DeviceHandle) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::OpenSession);
        let mut state = self.lock();
        if let Some(status) = state.open_failure.take() {
            return Err(status);
        }
        if !state.connected || state.handle != Some(handle) {
            return Err(DeviceStatus::INVALID_HANDLE);
        }
        state.session_open = true;
        debug!(handle = handle.0, "Virtual session opened");
        Ok(())
    }

    fn close_session(&mut self, handle: DeviceHandle) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::CloseSession);
        let mut state = self.lock();
        state.check_session(handle)?;
        state.session_open = false;
        // Closing the session drops host routing on the device
        if let Some(output) = state.properties.get_mut(&PropertyId::EvfOutputDevice) {
            *output &= !evf_output::PC;
        }
        Ok(())
    }

    fn release_device(&mut self, handle: DeviceHandle) {
        let _call = self.enter(GatewayCall::ReleaseDevice);
        let mut state = self.lock();
        if state.handle == Some(handle) {
            state.handle = None;
            state.session_open = false;
        }
    }

    fn get_property(&mut self, handle: DeviceHandle, id: PropertyId) -> GatewayResult<PropertyValue> {
        let _call = self.enter(GatewayCall::GetProperty(id));
        let state = self.lock();
        state.check_session(handle)?;
        if id == PropertyId::ProductName {
            return Ok(PropertyValue::Text(state.name.clone()));
        }
        let key = if id == PropertyId::AeModeSelect {
            PropertyId::AeMode
        } else {
            id
        };
        state
            .properties
            .get(&key)
            .map(|v| PropertyValue::UInt32(*v))
            .ok_or(DeviceStatus::PROPERTIES_UNAVAILABLE)
    }

    fn set_property(&mut self, handle: DeviceHandle, id: PropertyId, value: u32) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::SetProperty(id, value));
        let mut state = self.lock();
        state.check_session(handle)?;
        if let Some(status) = state.property_failures.get(&id) {
            return Err(*status);
        }
        if let Some(allowed) = state.allowed.get(&id)
            && !allowed.contains(&value)
        {
            return Err(DeviceStatus::INVALID_PARAMETER);
        }
        state.properties.insert(id, value);
        if state.notify_property_changes {
            state
                .pending
                .push_back(PendingEvent::Property(PropertyEvent::ValueChanged(id.code())));
        }
        Ok(())
    }

    fn get_allowed_values(&mut self, handle: DeviceHandle, id: PropertyId) -> GatewayResult<Vec<u32>> {
        let _call = self.enter(GatewayCall::GetAllowedValues(id));
        let state = self.lock();
        state.check_session(handle)?;
        state
            .allowed
            .get(&id)
            .cloned()
            .ok_or(DeviceStatus::PROPERTIES_UNAVAILABLE)
    }

    fn send_command(&mut self, handle: DeviceHandle, command: DeviceCommand) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::SendCommand(command));
        let (width, height, sequence) = {
            let mut state = self.lock();
            state.check_session(handle)?;
            if let Some(status) = state.command_failures.get(&command) {
                return Err(*status);
            }
            let fires = match command {
                DeviceCommand::TakePicture => true,
                DeviceCommand::PressShutter(ShutterButton::Completely) => {
                    state.shutter_down = true;
                    false
                }
                DeviceCommand::PressShutter(ShutterButton::Off) => {
                    std::mem::take(&mut state.shutter_down)
                }
                _ => false,
            };
            if !fires {
                return Ok(());
            }
            state.shots += 1;
            (state.frame_size.0, state.frame_size.1, state.shots as u64)
        };

        let data = test_pattern_jpeg(width, height, sequence).unwrap_or_default();
        let mut state = self.lock();
        let name = format!("IMG_{:04}.JPG", state.shots);
        let item = state.add_item(&name, data);
        if state.properties.get(&PropertyId::SaveTo) != Some(&save_to::CAMERA) {
            state
                .pending
                .push_back(PendingEvent::Object(ObjectEvent::DirItemRequestTransfer, item));
        }
        debug!(name = %name, "Virtual device captured a picture");
        Ok(())
    }

    fn set_capacity(&mut self, handle: DeviceHandle, capacity: HostCapacity) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::SetCapacity(capacity));
        self.lock().check_session(handle)
    }

    fn download_live_view(&mut self, handle: DeviceHandle, buffer: &mut [u8]) -> GatewayResult<usize> {
        let _call = self.enter(GatewayCall::DownloadLiveView);
        let (interval, size, sequence, corrupt) = {
            let mut state = self.lock();
            state.check_session(handle)?;
            if state.properties.get(&PropertyId::EvfOutputDevice).copied().unwrap_or(0)
                & evf_output::PC
                == 0
            {
                return Err(DeviceStatus::OBJECT_NOT_READY);
            }
            if state.live_view_failures > 0 {
                state.live_view_failures -= 1;
                return Err(DeviceStatus::DEVICE_BUSY);
            }
            let corrupt = state.corrupt_frames > 0;
            if corrupt {
                state.corrupt_frames -= 1;
            }
            state.frame_sequence += 1;
            (state.frame_interval, state.frame_size, state.frame_sequence, corrupt)
        };

        // Transfer time
        thread::sleep(interval);

        let data = if corrupt {
            vec![0xde, 0xad, 0xbe, 0xef]
        } else {
            test_pattern_jpeg(size.0, size.1, sequence).map_err(|_| DeviceStatus::INTERNAL_ERROR)?
        };
        if data.len() > buffer.len() {
            return Err(DeviceStatus::INVALID_PARAMETER);
        }
        buffer[..data.len()].copy_from_slice(&data);
        self.lock().frames_served += 1;
        Ok(data.len())
    }

    fn item_info(&mut self, item: ItemRef) -> GatewayResult<ItemInfo> {
        let _call = self.enter(GatewayCall::ItemInfo(item));
        self.lock()
            .items
            .get(&item)
            .map(|i| ItemInfo {
                name: i.name.clone(),
                size: i.data.len() as u64,
            })
            .ok_or(DeviceStatus::INVALID_HANDLE)
    }

    fn download_item(&mut self, item: ItemRef, size: u64, dest: &mut dyn Write) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::DownloadItem(item));
        let data = {
            let state = self.lock();
            if state.download_failures.contains(&item) {
                return Err(DeviceStatus::DEVICE_BUSY);
            }
            let stored = state.items.get(&item).ok_or(DeviceStatus::INVALID_HANDLE)?;
            let len = (size as usize).min(stored.data.len());
            stored.data[..len].to_vec()
        };
        dest.write_all(&data).map_err(|_| DeviceStatus::INTERNAL_ERROR)
    }

    fn complete_download(&mut self, item: ItemRef) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::CompleteDownload(item));
        if self.lock().items.contains_key(&item) {
            Ok(())
        } else {
            Err(DeviceStatus::INVALID_HANDLE)
        }
    }

    fn delete_item(&mut self, item: ItemRef) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::DeleteItem(item));
        let mut state = self.lock();
        if state.items.remove(&item).is_none() {
            return Err(DeviceStatus::INVALID_HANDLE);
        }
        state.deleted.push(item);
        Ok(())
    }

    fn release_item(&mut self, item: ItemRef) {
        let _call = self.enter(GatewayCall::ReleaseItem(item));
        self.lock().released.push(item);
    }

    fn set_attach_handler(&mut self, handler: Option<AttachHandler>, token: ContextToken) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::SetAttachHandler {
            registered: handler.is_some(),
        });
        self.lock().attach_handler = handler.map(|h| (h, token));
        Ok(())
    }

    fn set_object_handler(
        &mut self,
        _handle: DeviceHandle,
        handler: ObjectEventHandler,
        token: ContextToken,
    ) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::SetObjectHandler);
        self.lock().object_handler = Some((handler, token));
        Ok(())
    }

    fn set_property_handler(
        &mut self,
        _handle: DeviceHandle,
        handler: PropertyEventHandler,
        token: ContextToken,
    ) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::SetPropertyHandler);
        self.lock().property_handler = Some((handler, token));
        Ok(())
    }

    fn set_state_handler(
        &mut self,
        _handle: DeviceHandle,
        handler: StateEventHandler,
        token: ContextToken,
    ) -> GatewayResult<()> {
        let _call = self.enter(GatewayCall::SetStateHandler);
        self.lock().state_handler = Some((handler, token));
        Ok(())
    }
}
