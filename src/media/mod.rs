// SPDX-License-Identifier: GPL-3.0-only

//! Media processing for live view and recording
//!
//! # Modules
//!
//! - [`frame`]: Decoded frame buffers
//! - [`decoders`]: Live-view JPEG decoding
//! - [`encoders`]: Video writers for recordings

pub mod decoders;
pub mod encoders;
pub mod frame;

pub use decoders::{DecodeError, FrameDecoder, JpegDecoder};
pub use encoders::{VideoWriter, VideoWriterFactory, default_writer_factory};
pub use frame::{FrameBuffer, PixelFormat};
