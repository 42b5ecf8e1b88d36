// SPDX-License-Identifier: GPL-3.0-only

//! Live-view capture loop
//!
//! One thread per streaming period pulls encoded live-view images from the
//! device, decodes them outside the device lock, feeds the recording sink and
//! copies them into the display surface. Per-frame failures are expected (the
//! device often has no new image yet) and only skip that iteration.
//!
//! The loop ends itself when live-view routing no longer includes the host or
//! the session closes. On the way out it clears the displayed source.

use crate::backends::camera::{
    CaptureLoopController, DeviceHandle, DeviceLock, LoopAction,
};
use crate::constants::ROUTING_POLL_INTERVAL;
use crate::media::decoders::FrameDecoder;
use crate::media::frame::FrameBuffer;
use crate::pipelines::display::{DisplayBridge, DisplaySurface};
use crate::pipelines::video::RecordingSink;
use crate::session::events::EventHub;
use crate::session::link::SessionLink;
use crate::ui::UiContext;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything one capture loop needs
pub struct CaptureContext {
    pub gateway: DeviceLock,
    pub handle: DeviceHandle,
    pub link: Arc<SessionLink>,
    pub decoder: Arc<dyn FrameDecoder>,
    pub display: Arc<DisplayBridge>,
    pub recorder: Arc<RecordingSink>,
    pub events: Arc<EventHub>,
    pub ui: UiContext,
    pub max_frame_bytes: usize,
    pub routing_wait: Duration,
}

struct CaptureState {
    buffer: Vec<u8>,
    /// Surface allocated by this loop; starts empty so the first frame
    /// always publishes a fresh one
    surface: Option<Arc<DisplaySurface>>,
    frames: u64,
    skipped: u64,
}

/// Spawn the capture loop thread
pub fn start_capture(ctx: CaptureContext) -> CaptureLoopController {
    let ctx = Arc::new(ctx);
    let init_ctx = Arc::clone(&ctx);
    let exit_ctx = Arc::clone(&ctx);

    CaptureLoopController::start_with_init(
        "live-view",
        move || {
            init_ctx.wait_for_routing();
            Ok(CaptureState {
                buffer: vec![0; init_ctx.max_frame_bytes],
                surface: None,
                frames: 0,
                skipped: 0,
            })
        },
        move |state| ctx.iterate(state),
        move || exit_ctx.clear_display(),
    )
}

impl CaptureContext {
    fn should_run(&self) -> bool {
        self.link.is_open()
            && self.link.handle() == Some(self.handle)
            && self.link.routes_to_host()
    }

    /// Give freshly written routing time to show up in the property mirror
    fn wait_for_routing(&self) {
        let deadline = Instant::now() + self.routing_wait;
        while self.link.is_open() && !self.link.routes_to_host() && Instant::now() < deadline {
            thread::sleep(ROUTING_POLL_INTERVAL);
        }
    }

    fn iterate(&self, state: &mut CaptureState) -> LoopAction {
        if !self.should_run() {
            info!(
                frames = state.frames,
                skipped = state.skipped,
                "Live view no longer routed to host, stopping capture"
            );
            return LoopAction::Stop;
        }

        let read = self
            .gateway
            .with(|gw| gw.download_live_view(self.handle, &mut state.buffer));
        let len = match read {
            Ok(len) if len > 0 => len.min(state.buffer.len()),
            Ok(_) => {
                state.skipped += 1;
                return LoopAction::Continue;
            }
            Err(status) => {
                debug!(status = %status, "Live-view image unavailable");
                state.skipped += 1;
                thread::yield_now();
                return LoopAction::Continue;
            }
        };

        let frame = match self.decoder.decode(&state.buffer[..len]) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, bytes = len, "Skipping undecodable live-view image");
                state.skipped += 1;
                return LoopAction::Continue;
            }
        };

        self.recorder.push_frame(&frame);

        let Some(surface) = self.surface_for(state, &frame) else {
            return LoopAction::Stop;
        };
        surface.write_frame(&frame);
        state.frames += 1;
        LoopAction::Continue
    }

    /// Current surface, reallocated on the UI thread when the frame size changed
    fn surface_for(
        &self,
        state: &mut CaptureState,
        frame: &FrameBuffer,
    ) -> Option<Arc<DisplaySurface>> {
        if let Some(surface) = state.surface.as_ref().filter(|s| s.fits(frame)) {
            return Some(Arc::clone(surface));
        }

        let (width, height, format) = (frame.width, frame.height, frame.format);
        let display = Arc::clone(&self.display);
        let events = Arc::clone(&self.events);
        let allocated = self.ui.send(move || {
            let surface = Arc::new(DisplaySurface::new(width, height, format));
            if display.publish(Some(Arc::clone(&surface))) {
                events.emit_display_source_changed(Some(Arc::clone(&surface)));
            }
            surface
        });

        match allocated {
            Ok(surface) => {
                info!(width, height, "Display surface allocated");
                state.surface = Some(Arc::clone(&surface));
                Some(surface)
            }
            Err(e) => {
                warn!(error = %e, "Cannot reach UI thread, stopping capture");
                None
            }
        }
    }

    fn clear_display(&self) {
        let display = Arc::clone(&self.display);
        let events = Arc::clone(&self.events);
        self.ui.post(move || {
            if display.publish(None) {
                events.emit_display_source_changed(None);
            }
        });
    }
}
