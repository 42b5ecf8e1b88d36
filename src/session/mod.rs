// SPDX-License-Identifier: GPL-3.0-only

//! Session state machine
//!
//! [`Camera`] is the controller a host talks to. It owns the device session,
//! starts and stops the capture loop, arms the recording sink and routes
//! device notifications.
//!
//! ```text
//!            init / play                 play
//!   Idle ───────────────────▶ Open ─────────────────▶ Streaming
//!    ▲                         ▲  ◀───────────────────   │  ▲
//!    │                         │         stop            │  │ end_record
//!    │         close           │              begin_record│  │
//!    └─────────────────────────┘                         ▼  │
//!    ▲                                                Recording
//!    │            device shutdown (from any state)        │
//!    └────────────────────────────────────────────────────┘
//! ```
//!
//! Public operations are serialized against each other. Device calls go
//! through the shared [`DeviceLock`]; the property mirror is only ever locked
//! inside (never around) a device call.

pub mod events;
pub mod link;
pub mod registry;
pub mod transfer;

pub use events::{AssetCallback, DisplaySourceCallback, EventHub};
pub use link::SessionLink;
pub use registry::SessionRegistry;
pub use transfer::{IngestedAsset, TransferIngestor};

use crate::backends::camera::{
    CaptureLoopController, ContextToken, DeviceCommand, DeviceGateway, DeviceHandle, DeviceLock,
    DeviceStatus, HostCapacity, ItemRef, ObjectEvent, PropertyEvent, PropertyId, ShutterButton,
    StateEvent, dof_preview, evf_output, save_to,
};
use crate::config::Config;
use crate::constants::{
    JPEG_ONLY_QUALITIES, ShutterSequence, StopSequence, defaults, host_capacity,
};
use crate::errors::{CameraError, CameraResult};
use crate::media::decoders::{FrameDecoder, JpegDecoder};
use crate::media::encoders::{VideoWriterFactory, default_writer_factory};
use crate::media::frame::PixelFormat;
use crate::pipelines::capture::{CaptureContext, start_capture};
use crate::pipelines::display::DisplayBridge;
use crate::pipelines::video::RecordingSink;
use crate::storage::{NamingRule, SharedLocations};
use crate::ui::UiContext;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Coarse controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device session
    Idle,
    /// Session open, live view not routed to the host
    Open,
    /// Live view routed to the host
    Streaming,
    /// Streaming with a recording armed or open
    Recording,
}

#[derive(Debug, Clone)]
struct SessionOptions {
    settle_delay: Duration,
    routing_wait: Duration,
    max_frame_bytes: usize,
    stop_sequence: StopSequence,
    shutter_sequence: ShutterSequence,
}

struct RunningCapture {
    handle: DeviceHandle,
    controller: CaptureLoopController,
}

pub(crate) struct CameraInner {
    token: ContextToken,
    gateway: DeviceLock,
    registry: Arc<SessionRegistry>,
    ui: UiContext,
    decoder: Arc<dyn FrameDecoder>,
    display: Arc<DisplayBridge>,
    recorder: Arc<RecordingSink>,
    events: Arc<EventHub>,
    locations: SharedLocations,
    transfer: TransferIngestor,
    options: SessionOptions,
    link: Arc<SessionLink>,
    capture: Mutex<Option<RunningCapture>>,
    operations: Mutex<()>,
    disposed: AtomicBool,
}

/// Builder for [`Camera`]
pub struct CameraBuilder {
    gateway: DeviceLock,
    ui: UiContext,
    config: Config,
    decoder: Option<Arc<dyn FrameDecoder>>,
    writer_factory: Option<Arc<dyn VideoWriterFactory>>,
    registry: Option<Arc<SessionRegistry>>,
}

impl CameraBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn writer_factory(mut self, factory: Arc<dyn VideoWriterFactory>) -> Self {
        self.writer_factory = Some(factory);
        self
    }

    /// Share a registry between several controllers
    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Create the controller and arm the device-attach notification
    pub fn build(self) -> Camera {
        let config = self.config;
        let locations = SharedLocations::new(config.output_locations());
        let events = Arc::new(EventHub::new());
        let factory = self.writer_factory.unwrap_or_else(default_writer_factory);
        let recorder = Arc::new(RecordingSink::new(
            factory,
            locations.clone(),
            config.output_fps,
            config.pacing,
        ));
        let transfer = TransferIngestor::new(
            self.gateway.clone(),
            locations.clone(),
            Arc::clone(&events),
            self.ui.clone(),
        );

        let inner = Arc::new(CameraInner {
            token: ContextToken::new(),
            gateway: self.gateway,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(SessionRegistry::new())),
            ui: self.ui,
            decoder: self
                .decoder
                .unwrap_or_else(|| Arc::new(JpegDecoder::new(PixelFormat::Bgr24))),
            display: Arc::new(DisplayBridge::new()),
            recorder,
            events,
            locations,
            transfer,
            options: SessionOptions {
                settle_delay: config.settle_delay(),
                routing_wait: config.routing_wait(),
                max_frame_bytes: config.max_frame_bytes,
                stop_sequence: config.stop_sequence,
                shutter_sequence: config.shutter_sequence,
            },
            link: Arc::new(SessionLink::new()),
            capture: Mutex::new(None),
            operations: Mutex::new(()),
            disposed: AtomicBool::new(false),
        });

        inner.registry.insert(inner.token, &inner);
        inner.arm_attach();
        debug!(token = %inner.token, "Camera controller created");
        Camera { inner }
    }
}

/// Tethered camera controller
///
/// Dropping the controller disposes it.
pub struct Camera {
    inner: Arc<CameraInner>,
}

impl Camera {
    pub fn builder(gateway: DeviceLock, ui: UiContext) -> CameraBuilder {
        CameraBuilder {
            gateway,
            ui,
            config: Config::default(),
            decoder: None,
            writer_factory: None,
            registry: None,
        }
    }

    /// Locate the first device and open a session on it
    ///
    /// Does nothing when a session is already open. A failure part way
    /// through closes whatever was opened.
    pub fn init(&self) -> CameraResult<()> {
        let _ops = self.inner.operations();
        self.inner.init()
    }

    /// Route live view to the host and start the capture loop
    ///
    /// Opens a session first when none is open.
    pub fn play(&self) -> CameraResult<()> {
        self.inner.play()
    }

    /// Stop routing live view to the host
    ///
    /// Finishes an active recording. The capture loop notices and ends itself.
    pub fn stop(&self) -> CameraResult<()> {
        let _ops = self.inner.operations();
        self.inner.stop()
    }

    /// Take a picture; the file arrives through the transfer ingestor
    pub fn take_picture(&self) -> CameraResult<()> {
        let _ops = self.inner.operations();
        self.inner.take_picture()
    }

    /// Arm a recording, starting live view when needed
    pub fn begin_record(&self) -> CameraResult<()> {
        let _ops = self.inner.operations();
        self.inner.begin_record()
    }

    /// Finish the current recording
    ///
    /// Returns the written file, or `None` when no frame was recorded.
    pub fn end_record(&self) -> CameraResult<Option<PathBuf>> {
        let _ops = self.inner.operations();
        self.inner.end_record()
    }

    /// Close everything and detach every callback; idempotent
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Whether a capture loop thread is alive
    pub fn is_capturing(&self) -> bool {
        self.inner.is_capturing()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recorder.is_active()
    }

    /// Product name of the connected device
    pub fn device_name(&self) -> Option<String> {
        self.inner.link.device_name()
    }

    /// Mirrored value of a device property
    pub fn property(&self, id: PropertyId) -> Option<u32> {
        self.inner.link.properties(|p| p.value(id))
    }

    /// Display bridge for the host's refresh callback
    pub fn display(&self) -> Arc<DisplayBridge> {
        Arc::clone(&self.inner.display)
    }

    pub fn context_token(&self) -> ContextToken {
        self.inner.token
    }

    // ===== Configuration =====

    pub fn set_image_dir(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.inner.locations.update(|l| l.image_dir = dir);
    }

    pub fn set_video_dir(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.inner.locations.update(|l| l.video_dir = dir);
    }

    /// File stem generator for pictures and recordings
    pub fn set_naming(&self, naming: Option<NamingRule>) {
        self.inner.locations.update(|l| l.naming = naming);
    }

    pub fn image_dir(&self) -> PathBuf {
        self.inner.locations.snapshot().image_dir
    }

    pub fn video_dir(&self) -> PathBuf {
        self.inner.locations.snapshot().video_dir
    }

    // ===== Events =====

    pub fn on_display_source_changed(&self, callback: Option<DisplaySourceCallback>) {
        self.inner.events.set_display_source_changed(callback);
    }

    pub fn on_new_image(&self, callback: Option<AssetCallback>) {
        self.inner.events.set_new_image(callback);
    }

    pub fn on_new_video(&self, callback: Option<AssetCallback>) {
        self.inner.events.set_new_video(callback);
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("token", &self.inner.token)
            .field("state", &self.state())
            .field("device", &self.device_name())
            .finish()
    }
}

impl CameraInner {
    fn operations(&self) -> MutexGuard<'_, ()> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn open_handle(&self) -> CameraResult<DeviceHandle> {
        self.link
            .handle()
            .filter(|_| self.link.is_open())
            .ok_or(CameraError::NotConnected)
    }

    fn state(&self) -> SessionState {
        if self.open_handle().is_err() {
            SessionState::Idle
        } else if !self.link.routes_to_host() {
            SessionState::Open
        } else if self.recorder.is_active() {
            SessionState::Recording
        } else {
            SessionState::Streaming
        }
    }

    fn is_capturing(&self) -> bool {
        self.capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|c| c.controller.is_running())
    }

    // ===== Session open =====

    fn init(self: &Arc<Self>) -> CameraResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CameraError::NotConnected);
        }
        if self.open_handle().is_ok() {
            return Ok(());
        }

        match self.open_session() {
            Ok(()) => {
                info!(device = ?self.link.device_name(), "Camera session open");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Session initialization failed, rolling back");
                self.close(true, true);
                Err(e)
            }
        }
    }

    fn open_session(self: &Arc<Self>) -> CameraResult<()> {
        let handle = self
            .gateway
            .with(|gw| gw.find_first_device())
            .map_err(CameraError::DeviceNotFound)?;
        self.link.attach(handle);

        self.gateway.with(|gw| {
            gw.open_session(handle)
                .map_err(|s| CameraError::device("open session", s))?;
            self.register_handlers(gw, handle)
        })?;
        self.link.set_open(true);

        let name = self
            .gateway
            .with(|gw| gw.get_property(handle, PropertyId::ProductName))
            .map_err(|s| CameraError::device("read product name", s))?;
        self.link.set_device_name(name.into_text().unwrap_or_default());

        self.refresh_properties(handle);
        self.ensure_save_to_host(handle)?;
        self.push_defaults(handle);
        Ok(())
    }

    fn register_handlers(&self, gw: &mut dyn DeviceGateway, handle: DeviceHandle) -> CameraResult<()> {
        let registry = Arc::clone(&self.registry);
        gw.set_object_handler(
            handle,
            Arc::new(move |event, item, token| {
                if let Some(inner) = registry.lookup(token) {
                    inner.on_object_event(event, item);
                }
            }),
            self.token,
        )
        .map_err(|s| CameraError::device("register object handler", s))?;

        let registry = Arc::clone(&self.registry);
        gw.set_property_handler(
            handle,
            Arc::new(move |event, token| {
                if let Some(inner) = registry.lookup(token) {
                    inner.on_property_event(event);
                }
            }),
            self.token,
        )
        .map_err(|s| CameraError::device("register property handler", s))?;

        let registry = Arc::clone(&self.registry);
        gw.set_state_handler(
            handle,
            Arc::new(move |event, token| {
                if let Some(inner) = registry.lookup(token) {
                    inner.on_state_event(event);
                }
            }),
            self.token,
        )
        .map_err(|s| CameraError::device("register state handler", s))
    }

    /// Arm the device-attach notification for automatic reconnection
    fn arm_attach(&self) {
        let registry = Arc::clone(&self.registry);
        let result = self.gateway.with(|gw| {
            gw.set_attach_handler(
                Some(Arc::new(move |token| {
                    if let Some(inner) = registry.lookup(token) {
                        inner.on_device_attached();
                    }
                })),
                self.token,
            )
        });
        if let Err(status) = result {
            warn!(status = %status, "Failed to register device attach handler");
        }
    }

    /// Read every mirrored property and its allowed values
    fn refresh_properties(&self, handle: DeviceHandle) {
        self.gateway.with(|gw| {
            for id in PropertyId::MIRRORED {
                match gw.get_property(handle, id) {
                    Ok(value) => {
                        if let Some(value) = value.as_u32() {
                            self.link.properties(|p| p.update_value(id, value));
                        }
                    }
                    Err(status) => debug!(property = %id, status = %status, "Property not readable"),
                }
                if id.is_enumerated() {
                    match gw.get_allowed_values(handle, id) {
                        Ok(values) => self.link.properties(|p| p.update_allowed(id, values)),
                        Err(status) => {
                            debug!(property = %id, status = %status, "Allowed values not readable")
                        }
                    }
                }
            }
        });
    }

    /// Write a property and mirror the new value
    fn write_property(
        &self,
        handle: DeviceHandle,
        id: PropertyId,
        value: u32,
        step: &'static str,
    ) -> CameraResult<()> {
        self.gateway.with(|gw| {
            gw.set_property(handle, id, value)
                .map_err(|s| CameraError::device(step, s))?;
            self.link.properties(|p| p.update_value(id, value));
            Ok(())
        })
    }

    /// Make the device deliver captured files to the host
    fn ensure_save_to_host(&self, handle: DeviceHandle) -> CameraResult<()> {
        if self.link.properties(|p| p.saves_to_host()) {
            return Ok(());
        }
        self.write_property(handle, PropertyId::SaveTo, save_to::HOST, "set save destination")?;

        self.gateway.with(|gw| {
            gw.send_command(handle, DeviceCommand::UiLock)
                .map_err(|s| CameraError::device("lock device UI", s))?;
            let capacity = gw
                .set_capacity(
                    handle,
                    HostCapacity {
                        free_clusters: host_capacity::FREE_CLUSTERS,
                        bytes_per_sector: host_capacity::BYTES_PER_SECTOR,
                        reset: true,
                    },
                )
                .map_err(|s| CameraError::device("set host capacity", s));
            let unlock = gw
                .send_command(handle, DeviceCommand::UiUnlock)
                .map_err(|s| CameraError::device("unlock device UI", s));
            capacity.and(unlock)
        })
    }

    /// Push the preferred shooting defaults where the device differs
    ///
    /// Failures are logged and do not fail the session.
    fn push_defaults(&self, handle: DeviceHandle) {
        let (quality, quality_ok) = self.link.properties(|p| {
            let current_ok = p
                .value(PropertyId::ImageQuality)
                .is_some_and(|q| JPEG_ONLY_QUALITIES.contains(&q));
            (p.jpeg_only_quality(), current_ok)
        });
        match quality {
            Some(quality) => self.push_default(handle, PropertyId::ImageQuality, quality),
            None if !quality_ok => warn!(
                status = %DeviceStatus::INVALID_HANDLE,
                "Device offers no JPEG-only image quality"
            ),
            None => {}
        }

        let wanted = [
            (PropertyId::IsoSpeed, defaults::ISO_SPEED),
            (PropertyId::ExposureCompensation, defaults::EXPOSURE_COMPENSATION),
            (PropertyId::WhiteBalance, defaults::WHITE_BALANCE),
            (PropertyId::MeteringMode, defaults::METERING_MODE),
            (PropertyId::DriveMode, defaults::DRIVE_MODE),
            (PropertyId::Tv, defaults::SHUTTER_SPEED),
        ];
        for (id, value) in wanted {
            if self.link.properties(|p| p.differs_from(id, value)) {
                self.push_default(handle, id, value);
            }
        }
    }

    fn push_default(&self, handle: DeviceHandle, id: PropertyId, value: u32) {
        if let Err(e) = self.write_property(handle, id, value, "set default") {
            warn!(property = %id, value, error = %e, "Failed to push default");
        }
    }

    // ===== Live view =====

    fn play(self: &Arc<Self>) -> CameraResult<()> {
        let _ops = self.operations();
        self.play_locked()
    }

    fn play_locked(self: &Arc<Self>) -> CameraResult<()> {
        if self.open_handle().is_err() {
            self.init()?;
            thread::sleep(self.options.settle_delay);
        }
        let handle = self.open_handle()?;

        if !self.link.routes_to_host() {
            let output = self.link.properties(|p| p.live_view_output()) | evf_output::PC;
            self.write_property(handle, PropertyId::EvfOutputDevice, output, "start live view")?;
        }
        self.ensure_capture(handle);
        Ok(())
    }

    /// Start a capture loop unless one is already serving `handle`
    fn ensure_capture(&self, handle: DeviceHandle) {
        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = capture.as_ref()
            && running.handle == handle
            && running.controller.try_resume()
        {
            return;
        }

        let controller = start_capture(CaptureContext {
            gateway: self.gateway.clone(),
            handle,
            link: Arc::clone(&self.link),
            decoder: Arc::clone(&self.decoder),
            display: Arc::clone(&self.display),
            recorder: Arc::clone(&self.recorder),
            events: Arc::clone(&self.events),
            ui: self.ui.clone(),
            max_frame_bytes: self.options.max_frame_bytes,
            routing_wait: self.options.routing_wait,
        });
        *capture = Some(RunningCapture { handle, controller });
    }

    fn stop(&self) -> CameraResult<()> {
        let Ok(handle) = self.open_handle() else {
            return Ok(());
        };
        if !self.link.routes_to_host() {
            return Ok(());
        }

        if self.options.stop_sequence == StopSequence::DisableDofPreviewThenRouting
            && self.link.properties(|p| p.dof_preview_active())
        {
            self.write_property(
                handle,
                PropertyId::EvfDepthOfFieldPreview,
                dof_preview::OFF,
                "disable depth-of-field preview",
            )?;
        }

        let output = self.link.properties(|p| p.live_view_output()) & !evf_output::PC;
        self.write_property(handle, PropertyId::EvfOutputDevice, output, "stop live view")?;
        info!("Live view stopped");

        // A recording never outlives host routing
        if let Some(path) = self.recorder.end()? {
            self.announce_video(path);
        }
        Ok(())
    }

    // ===== Capture =====

    fn take_picture(&self) -> CameraResult<()> {
        let handle = self.open_handle()?;
        self.ensure_save_to_host(handle)?;

        match self.options.shutter_sequence {
            ShutterSequence::PressRelease => self.gateway.with(|gw| {
                gw.send_command(handle, DeviceCommand::PressShutter(ShutterButton::Completely))
                    .map_err(|s| CameraError::device("press shutter", s))?;
                gw.send_command(handle, DeviceCommand::PressShutter(ShutterButton::Off))
                    .map_err(|s| CameraError::device("release shutter", s))
            }),
            ShutterSequence::TakePicture => self.gateway.with(|gw| {
                gw.send_command(handle, DeviceCommand::TakePicture)
                    .map_err(|s| CameraError::device("take picture", s))
            }),
        }
    }

    fn begin_record(self: &Arc<Self>) -> CameraResult<()> {
        self.open_handle()?;
        if self.recorder.is_active() {
            return Ok(());
        }
        if !self.link.routes_to_host() {
            self.play_locked()?;
        }
        self.recorder.begin();
        Ok(())
    }

    fn end_record(&self) -> CameraResult<Option<PathBuf>> {
        self.open_handle()?;
        let path = self.recorder.end()?;
        if let Some(path) = &path {
            self.announce_video(path.clone());
        }
        Ok(path)
    }

    fn announce_video(&self, path: PathBuf) {
        let events = Arc::clone(&self.events);
        self.ui.post(move || events.emit_new_video(&path));
    }

    // ===== Teardown =====

    /// End the session
    ///
    /// `device_present` is false after a shutdown notification, when the
    /// session can no longer be closed on the device.
    fn close(&self, rearm: bool, device_present: bool) {
        match self.recorder.end() {
            Ok(Some(path)) => self.announce_video(path),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to finish recording during teardown"),
        }

        // The controller stays in place until its thread is gone
        if let Some(running) = self
            .capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            running.controller.request_stop();
        }

        let was_open = self.link.is_open();
        self.link.set_open(false);
        let routed = self.link.routes_to_host();
        let output = self.link.properties(|p| {
            let output = p.live_view_output() & !evf_output::PC;
            p.update_value(PropertyId::EvfOutputDevice, output);
            output
        });

        if let Some(handle) = self.link.detach() {
            self.gateway.with(|gw| {
                if device_present && was_open {
                    if routed
                        && let Err(status) =
                            gw.set_property(handle, PropertyId::EvfOutputDevice, output)
                    {
                        debug!(status = %status, "Failed to restore live-view routing");
                    }
                    if let Err(status) = gw.close_session(handle) {
                        debug!(status = %status, "Failed to close session");
                    }
                }
                gw.release_device(handle);
            });
            info!(handle = handle.0, "Camera session closed");
        }

        if rearm {
            self.arm_attach();
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ops = self.operations();
        self.close(false, true);

        let result = self.gateway.with(|gw| gw.set_attach_handler(None, self.token));
        if let Err(status) = result {
            debug!(status = %status, "Failed to clear device attach handler");
        }
        self.events.clear();
        self.locations.update(|l| l.naming = None);
        self.registry.remove(self.token);
        debug!(token = %self.token, "Camera controller disposed");
    }

    // ===== Device notifications =====

    fn on_object_event(&self, event: ObjectEvent, item: ItemRef) {
        self.transfer.handle_object_event(event, item);
    }

    fn on_property_event(&self, event: PropertyEvent) {
        let Some(handle) = self.link.handle() else {
            return;
        };
        let (code, allowed_changed) = match event {
            PropertyEvent::ValueChanged(code) => (code, false),
            PropertyEvent::AllowedValuesChanged(code) => (code, true),
        };
        let Some(id) = PropertyId::from_code(code) else {
            return;
        };
        if id == PropertyId::ProductName {
            return;
        }

        self.gateway.with(|gw| {
            if allowed_changed {
                if !id.is_enumerated() {
                    return;
                }
                match gw.get_allowed_values(handle, id) {
                    Ok(values) => self.link.properties(|p| p.update_allowed(id, values)),
                    Err(status) => debug!(property = %id, status = %status, "Allowed values not readable"),
                }
            } else {
                match gw.get_property(handle, id) {
                    Ok(value) => {
                        if let Some(value) = value.as_u32()
                            && self.link.properties(|p| p.update_value(id, value))
                        {
                            debug!(property = %id, value, "Property changed");
                        }
                    }
                    Err(status) => debug!(property = %id, status = %status, "Property not readable"),
                }
            }
        });
    }

    fn on_state_event(self: &Arc<Self>, event: StateEvent) {
        if event != StateEvent::Shutdown {
            debug!(event = ?event, "Ignoring state event");
            return;
        }
        info!("Device shut down");
        // Stops the capture loop at its next check
        self.link.set_open(false);

        let inner = Arc::clone(self);
        let posted = self.ui.post(move || inner.session_lost());
        if !posted {
            self.session_lost();
        }
    }

    fn session_lost(&self) {
        let _ops = self.operations();
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.close(true, false);
    }

    fn on_device_attached(self: &Arc<Self>) {
        info!("Device attached");
        let inner = Arc::clone(self);
        self.ui.post(move || {
            if inner.disposed.load(Ordering::SeqCst) || inner.link.handle().is_some() {
                return;
            }
            if let Err(e) = inner.play() {
                error!(error = %e, "Automatic reconnect failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::{GatewayCall, VirtualDevice};
    use crate::ui;

    fn camera(device: &VirtualDevice) -> (Camera, ui::UiDispatcher) {
        let (ui, dispatcher) = ui::channel();
        let config = Config {
            settle_delay_ms: 0,
            ..Config::default()
        };
        let camera = Camera::builder(DeviceLock::new(device.clone()), ui)
            .config(config)
            .build();
        (camera, dispatcher)
    }

    #[test]
    fn test_init_without_device_reports_not_found() {
        let device = VirtualDevice::default().detached();
        let (camera, _dispatcher) = camera(&device);

        let err = camera.init().unwrap_err();
        assert_eq!(err, CameraError::DeviceNotFound(DeviceStatus::DEVICE_NOT_FOUND));
        assert_eq!(camera.state(), SessionState::Idle);
        assert!(device.has_attach_handler());
    }

    #[test]
    fn test_init_pushes_only_differing_defaults() {
        let device = VirtualDevice::default();
        device.set_device_property(PropertyId::Tv, defaults::SHUTTER_SPEED);
        let (camera, _dispatcher) = camera(&device);

        camera.init().unwrap();

        assert_eq!(camera.state(), SessionState::Open);
        assert_eq!(camera.device_name().as_deref(), Some("Virtual EOS"));
        assert_eq!(device.property_writes(PropertyId::Tv), 0);
        assert_eq!(device.property_writes(PropertyId::SaveTo), 1);
        assert_eq!(device.device_property(PropertyId::IsoSpeed), Some(defaults::ISO_SPEED));
        assert_eq!(device.device_property(PropertyId::ImageQuality), Some(0x0013_ff0f));
        assert_eq!(
            device.commands(),
            vec![DeviceCommand::UiLock, DeviceCommand::UiUnlock]
        );
    }

    #[test]
    fn test_init_rolls_back_on_failure() {
        let device = VirtualDevice::default();
        device.fail_property(PropertyId::SaveTo, Some(DeviceStatus::DEVICE_BUSY));
        let (camera, _dispatcher) = camera(&device);

        let err = camera.init().unwrap_err();
        assert_eq!(err.status(), Some(DeviceStatus::DEVICE_BUSY));
        assert!(err.to_string().contains("set save destination"));
        assert_eq!(camera.state(), SessionState::Idle);
        assert!(!device.is_session_open());
        assert!(device.calls().contains(&GatewayCall::ReleaseDevice));
    }

    #[test]
    fn test_picture_before_init_not_connected() {
        let device = VirtualDevice::default();
        let (camera, _dispatcher) = camera(&device);
        assert_eq!(camera.take_picture(), Err(CameraError::NotConnected));
        assert_eq!(camera.end_record(), Err(CameraError::NotConnected));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let device = VirtualDevice::default();
        let (camera, _dispatcher) = camera(&device);
        camera.init().unwrap();

        camera.dispose();
        camera.dispose();

        assert_eq!(camera.state(), SessionState::Idle);
        assert!(!device.has_attach_handler());
        assert_eq!(
            device
                .calls()
                .iter()
                .filter(|c| **c == GatewayCall::CloseSession)
                .count(),
            1
        );
    }

    #[test]
    fn test_capturing_until_loop_thread_exits() {
        let device = VirtualDevice::default().with_frame_interval(Duration::from_millis(1));
        let (camera, mut dispatcher) = camera(&device);
        camera.play().unwrap();

        // The first frame parks the loop on the UI thread for its surface
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while device.frames_served() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        thread::sleep(Duration::from_millis(100));

        camera.dispose();
        assert!(camera.is_capturing());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while camera.is_capturing() && std::time::Instant::now() < deadline {
            dispatcher.run_pending();
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!camera.is_capturing());
    }
}
