// SPDX-License-Identifier: GPL-3.0-only

//! MP4 recording through GStreamer
//!
//! Pipeline: appsrc → videoconvert → x264enc → mp4mux → filesink
//!
//! Buffers are timestamped from their output index, so dropped indices show up
//! as held frames in the finished file.

use super::video::{VideoWriter, VideoWriterFactory};
use crate::errors::RecordingError;
use crate::media::frame::{FrameBuffer, PixelFormat};
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Opens H.264/MP4 writers
#[derive(Debug, Clone, Copy)]
pub struct GstMp4Factory {
    format: PixelFormat,
}

impl GstMp4Factory {
    pub fn new(format: PixelFormat) -> Self {
        Self { format }
    }
}

impl Default for GstMp4Factory {
    fn default() -> Self {
        Self::new(PixelFormat::Bgr24)
    }
}

impl VideoWriterFactory for GstMp4Factory {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>, RecordingError> {
        let open_err = |message: String| RecordingError::Open {
            path: path.to_path_buf(),
            message,
        };

        gstreamer::init().map_err(|e| open_err(format!("GStreamer init failed: {}", e)))?;

        let video_format = match self.format {
            PixelFormat::Bgr24 => gstreamer_video::VideoFormat::Bgr,
            PixelFormat::Rgb24 => gstreamer_video::VideoFormat::Rgb,
        };
        let info = gstreamer_video::VideoInfo::builder(video_format, width, height)
            .fps(gstreamer::Fraction::new(fps as i32, 1))
            .build()
            .map_err(|e| open_err(format!("Invalid video info: {}", e)))?;
        let caps = info
            .to_caps()
            .map_err(|e| open_err(format!("Failed to build caps: {}", e)))?;

        let pipeline = gstreamer::Pipeline::new();
        let make = |factory: &str| {
            gstreamer::ElementFactory::make(factory)
                .build()
                .map_err(|e| open_err(format!("Failed to create {}: {}", factory, e)))
        };

        let appsrc = make("appsrc")?
            .downcast::<AppSrc>()
            .map_err(|_| open_err("Failed to downcast to AppSrc".into()))?;
        let videoconvert = make("videoconvert")?;
        let encoder = make("x264enc")?;
        let muxer = make("mp4mux")?;
        let filesink = make("filesink")?;

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gstreamer::Format::Time);
        appsrc.set_is_live(false);
        filesink.set_property("location", path.to_string_lossy().to_string());

        pipeline
            .add_many([appsrc.upcast_ref(), &videoconvert, &encoder, &muxer, &filesink])
            .map_err(|e| open_err(format!("Failed to add elements: {}", e)))?;
        gstreamer::Element::link_many([appsrc.upcast_ref(), &videoconvert, &encoder, &muxer, &filesink])
            .map_err(|e| open_err(format!("Failed to link elements: {}", e)))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| open_err(format!("Failed to start pipeline: {}", e)))?;

        info!(path = %path.display(), width, height, fps, "Opened MP4 recording pipeline");

        Ok(Box::new(GstMp4Writer {
            path: path.to_path_buf(),
            pipeline,
            appsrc,
            info,
            fps,
        }))
    }
}

struct GstMp4Writer {
    path: PathBuf,
    pipeline: gstreamer::Pipeline,
    appsrc: AppSrc,
    info: gstreamer_video::VideoInfo,
    fps: u32,
}

impl GstMp4Writer {
    fn frame_time(&self, index: u64) -> gstreamer::ClockTime {
        gstreamer::ClockTime::from_nseconds(index * 1_000_000_000 / self.fps as u64)
    }
}

impl VideoWriter for GstMp4Writer {
    fn write_frame(&mut self, frame: &FrameBuffer, index: u64) -> Result<(), RecordingError> {
        let write_err = |message: String| RecordingError::Write { index, message };

        if !frame.same_dimensions(self.info.width(), self.info.height()) {
            return Err(write_err(format!(
                "Frame size {}x{} doesn't match recording {}x{}",
                frame.width,
                frame.height,
                self.info.width(),
                self.info.height()
            )));
        }

        let dest_stride = self.info.stride()[0] as usize;
        let mut buffer = gstreamer::Buffer::with_size(self.info.size())
            .map_err(|e| write_err(format!("Failed to create buffer: {}", e)))?;
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| write_err("Failed to get mutable buffer reference".into()))?;
            buffer_ref.set_pts(self.frame_time(index));
            buffer_ref.set_duration(self.frame_time(1));

            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| write_err(format!("Failed to map buffer: {}", e)))?;
            let row_bytes = frame.row_bytes();
            for y in 0..frame.height {
                let start = y as usize * dest_stride;
                map[start..start + row_bytes].copy_from_slice(frame.row(y));
            }
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| write_err(format!("Failed to push frame: {:?}", e)))?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, RecordingError> {
        let finalize_err = |message: String| RecordingError::Finalize {
            path: self.path.clone(),
            message,
        };

        debug!(path = %self.path.display(), "Sending EOS to recording pipeline");
        self.appsrc
            .end_of_stream()
            .map_err(|e| finalize_err(format!("Failed to send EOS: {}", e)))?;

        if let Some(bus) = self.pipeline.bus() {
            let msg = bus.timed_pop_filtered(
                gstreamer::ClockTime::from_seconds(5),
                &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
            );
            match msg.as_ref().map(|m| m.view()) {
                Some(gstreamer::MessageView::Error(err)) => {
                    let _ = self.pipeline.set_state(gstreamer::State::Null);
                    return Err(finalize_err(err.error().to_string()));
                }
                Some(_) => {}
                None => warn!(path = %self.path.display(), "Timed out waiting for EOS"),
            }
        }

        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| finalize_err(format!("Failed to stop pipeline: {}", e)))?;

        info!(path = %self.path.display(), "Finalized MP4 recording");
        Ok(self.path.clone())
    }
}
