// SPDX-License-Identifier: GPL-3.0-only

//! Live-view image decoders
//!
//! The device delivers each live-view image as an encoded JPEG. Decoders turn
//! it into a [`FrameBuffer`] in the pixel layout the display expects.

use crate::media::frame::{FrameBuffer, PixelFormat};
use std::fmt;

/// Decoder failure for a single live-view image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to decode live-view image: {}", self.0)
    }
}

impl std::error::Error for DecodeError {}

/// Turns encoded live-view bytes into a frame
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<FrameBuffer, DecodeError>;
}

/// JPEG decoder backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegDecoder {
    format: PixelFormat,
}

impl JpegDecoder {
    pub fn new(format: PixelFormat) -> Self {
        Self { format }
    }
}

impl FrameDecoder for JpegDecoder {
    fn decode(&self, data: &[u8]) -> Result<FrameBuffer, DecodeError> {
        let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
            .map_err(|e| DecodeError(e.to_string()))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        let mut pixels = img.into_raw();
        if self.format == PixelFormat::Bgr24 {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }
        Ok(FrameBuffer::packed(width, height, self.format, pixels))
    }
}
