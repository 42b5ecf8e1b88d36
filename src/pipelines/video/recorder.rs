// SPDX-License-Identifier: GPL-3.0-only

//! Recording sink
//!
//! `begin` arms a recording without touching the filesystem. The output file
//! is opened by the first frame that arrives afterwards, sized to that frame.
//! Every frame after that is written at the output index its arrival time
//! maps to (see [`FramePacer`]).
//!
//! All state sits behind one private lock, independent of the device lock, so
//! `end` can run while a frame is being written on the capture thread.

use super::pacing::FramePacer;
use crate::constants::FramePacing;
use crate::errors::{CameraResult, RecordingError};
use crate::media::encoders::{VideoWriter, VideoWriterFactory};
use crate::media::frame::FrameBuffer;
use crate::storage::{self, SharedLocations};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

struct RecordingSession {
    writer: Option<Box<dyn VideoWriter>>,
    path: Option<PathBuf>,
    pacer: FramePacer,
    frames_written: u64,
}

/// Paced video output fed from the capture loop
pub struct RecordingSink {
    session: Mutex<Option<RecordingSession>>,
    factory: Arc<dyn VideoWriterFactory>,
    locations: SharedLocations,
    fps: u32,
    pacing: FramePacing,
}

impl RecordingSink {
    pub fn new(
        factory: Arc<dyn VideoWriterFactory>,
        locations: SharedLocations,
        fps: u32,
        pacing: FramePacing,
    ) -> Self {
        Self {
            session: Mutex::new(None),
            factory,
            locations,
            fps: fps.max(1),
            pacing,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<RecordingSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a recording is armed or open
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Path of the open output file, once the first frame arrived
    pub fn output_path(&self) -> Option<PathBuf> {
        self.lock().as_ref().and_then(|s| s.path.clone())
    }

    /// Arm a recording; the file opens on the next frame
    ///
    /// Returns false if a recording is already active.
    pub fn begin(&self) -> bool {
        let mut session = self.lock();
        if session.is_some() {
            return false;
        }
        *session = Some(RecordingSession {
            writer: None,
            path: None,
            pacer: FramePacer::new(self.fps, self.pacing),
            frames_written: 0,
        });
        info!(fps = self.fps, pacing = ?self.pacing, "Recording armed, waiting for first frame");
        true
    }

    /// Feed one decoded frame
    ///
    /// Failures are logged. A recording whose file cannot be opened is
    /// abandoned; a failed frame write only loses that frame.
    pub fn push_frame(&self, frame: &FrameBuffer) {
        let mut guard = self.lock();
        let Some(session) = guard.as_mut() else {
            return;
        };

        if session.writer.is_none() {
            match self.open(frame) {
                Ok((writer, path)) => {
                    session.writer = Some(writer);
                    session.path = Some(path);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to open recording, abandoning it");
                    *guard = None;
                    return;
                }
            }
        }

        let indices = session.pacer.advance(frame.captured_at);
        let Some(writer) = session.writer.as_mut() else {
            return;
        };
        for index in indices {
            match writer.write_frame(frame, index) {
                Ok(()) => session.frames_written += 1,
                Err(e) => warn!(error = %e, "Failed to write recording frame"),
            }
        }
    }

    fn open(&self, frame: &FrameBuffer) -> Result<(Box<dyn VideoWriter>, PathBuf), RecordingError> {
        let locations = self.locations.snapshot();
        let path = storage::resolve_output_path(
            &locations.video_dir,
            locations.naming.as_ref(),
            &storage::epoch_millis_name(),
            self.factory.extension(),
        )
        .map_err(|e| RecordingError::CreateDir {
            path: locations.video_dir.clone(),
            message: e.to_string(),
        })?;

        let writer = self.factory.open(&path, frame.width, frame.height, self.fps)?;
        info!(
            path = %path.display(),
            width = frame.width,
            height = frame.height,
            fps = self.fps,
            "Recording started"
        );
        Ok((writer, path))
    }

    /// Finish the active recording
    ///
    /// Returns the finished file, or `None` when nothing was recording or no
    /// frame arrived since `begin`.
    pub fn end(&self) -> CameraResult<Option<PathBuf>> {
        let Some(session) = self.lock().take() else {
            return Ok(None);
        };
        let Some(writer) = session.writer else {
            debug!("Recording ended before the first frame");
            return Ok(None);
        };

        let path = writer.finish()?;
        info!(
            path = %path.display(),
            frames = session.frames_written,
            last_index = ?session.pacer.last_index(),
            "Recording finished"
        );
        Ok(Some(path))
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            warn!(error = %e, "Failed to finish recording on drop");
        }
    }
}
