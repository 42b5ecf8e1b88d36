// SPDX-License-Identifier: GPL-3.0-only

//! Video writers used by the recording sink
//!
//! - [`video::FrameSequenceFactory`]: numbered JPEG frames plus a manifest
//!   (always available)
//! - [`mp4::GstMp4Factory`]: H.264 in MP4 (`gstreamer` feature)

#[cfg(feature = "gstreamer")]
pub mod mp4;
pub mod video;

pub use video::{FrameSequenceFactory, SequenceManifest, VideoWriter, VideoWriterFactory};

use std::sync::Arc;

/// Writer factory selected at build time
pub fn default_writer_factory() -> Arc<dyn VideoWriterFactory> {
    #[cfg(feature = "gstreamer")]
    {
        Arc::new(mp4::GstMp4Factory::default())
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        Arc::new(FrameSequenceFactory::default())
    }
}
