// SPDX-License-Identifier: GPL-3.0-only

//! Decoded live-view frames

use std::sync::Arc;
use std::time::Instant;

/// Packed 24-bit pixel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Blue, green, red byte order (the device-native display layout)
    #[default]
    Bgr24,
    /// Red, green, blue byte order
    Rgb24,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(&self) -> usize {
        3
    }
}

/// One decoded frame
///
/// Pixel data is shared so the recorder and the display bridge can both hold
/// the frame without copying.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `width * 3`
    pub stride: usize,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    /// When the frame was read from the device
    pub captured_at: Instant,
}

impl FrameBuffer {
    /// Build a tightly packed frame (`stride == width * 3`)
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            format,
            data: Arc::from(data),
            captured_at: Instant::now(),
        }
    }

    pub fn with_timestamp(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Bytes of pixel data in one row, excluding padding
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Pixel bytes of row `y`, excluding padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    pub fn same_dimensions(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Copy the pixels out as tightly packed RGB
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for y in 0..self.height {
            let row = self.row(y);
            match self.format {
                PixelFormat::Rgb24 => out.extend_from_slice(row),
                PixelFormat::Bgr24 => {
                    for px in row.chunks_exact(3) {
                        out.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_skip_padding() {
        // 2x2 frame with one padding byte per row
        let data = vec![1, 2, 3, 4, 5, 6, 0, 7, 8, 9, 10, 11, 12, 0];
        let frame = FrameBuffer {
            width: 2,
            height: 2,
            stride: 7,
            format: PixelFormat::Rgb24,
            data: Arc::from(data),
            captured_at: Instant::now(),
        };
        assert_eq!(frame.row(1), &[7, 8, 9, 10, 11, 12]);
        assert_eq!(frame.to_rgb().len(), 12);
    }

    #[test]
    fn test_bgr_to_rgb() {
        let frame = FrameBuffer::packed(1, 1, PixelFormat::Bgr24, vec![10, 20, 30]);
        assert_eq!(frame.to_rgb(), vec![30, 20, 10]);
    }
}
