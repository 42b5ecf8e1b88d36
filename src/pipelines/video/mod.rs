// SPDX-License-Identifier: GPL-3.0-only

//! Video recording from the live-view stream
//!
//! The recording sink receives every decoded frame from the capture loop and
//! writes them at a fixed output rate through a [`VideoWriterFactory`].
//!
//! [`VideoWriterFactory`]: crate::media::encoders::VideoWriterFactory

pub mod pacing;
pub mod recorder;

pub use pacing::FramePacer;
pub use recorder::RecordingSink;
