// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot handoff of the latest frame to the display
//!
//! The capture loop copies every decoded frame into the current
//! [`DisplaySurface`] and raises its new-frame flag. The host calls
//! [`DisplayBridge::on_refresh_tick`] once per refresh; a tick presents the
//! surface only when the flag was raised since the previous presentation.
//! Frames written between two ticks overwrite each other, so the display only
//! ever shows the newest one.

use crate::media::frame::{FrameBuffer, PixelFormat};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Row alignment of display surfaces, in bytes
const ROW_ALIGNMENT: usize = 4;

/// Reusable pixel buffer shown by the host
#[derive(Debug)]
pub struct DisplaySurface {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    pixels: Mutex<Vec<u8>>,
    new_frame: AtomicBool,
    generation: AtomicU64,
}

impl DisplaySurface {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let row_bytes = width as usize * format.bytes_per_pixel();
        let stride = row_bytes.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;
        Self {
            width,
            height,
            stride,
            format,
            pixels: Mutex::new(vec![0; stride * height as usize]),
            new_frame: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Surface sized for `frame`
    pub fn for_frame(frame: &FrameBuffer) -> Self {
        Self::new(frame.width, frame.height, frame.format)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn fits(&self, frame: &FrameBuffer) -> bool {
        frame.same_dimensions(self.width, self.height) && frame.format == self.format
    }

    /// Number of frames written so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn lock_pixels(&self) -> MutexGuard<'_, Vec<u8>> {
        self.pixels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy `frame` into the surface and raise the new-frame flag
    ///
    /// Returns the new generation, or `None` when the frame does not fit and
    /// the surface must be reallocated first.
    pub fn write_frame(&self, frame: &FrameBuffer) -> Option<u64> {
        if !self.fits(frame) {
            return None;
        }
        {
            let mut pixels = self.lock_pixels();
            if frame.stride == self.stride {
                let len = pixels.len().min(frame.data.len());
                pixels[..len].copy_from_slice(&frame.data[..len]);
            } else {
                let row_bytes = frame.row_bytes();
                for y in 0..frame.height {
                    let start = y as usize * self.stride;
                    pixels[start..start + row_bytes].copy_from_slice(frame.row(y));
                }
            }
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.new_frame.store(true, Ordering::Release);
        Some(generation)
    }

    /// Test and clear the new-frame flag
    pub fn take_new_frame(&self) -> bool {
        self.new_frame.swap(false, Ordering::AcqRel)
    }

    /// Read the pixels (`stride * height` bytes)
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let pixels = self.lock_pixels();
        f(&pixels)
    }
}

/// A refresh tick that found a new frame
#[derive(Debug, Clone)]
pub struct Presentation {
    pub surface: Arc<DisplaySurface>,
    /// Generation of the newest frame at presentation time
    pub generation: u64,
}

/// Owner of the current display surface
#[derive(Debug, Default)]
pub struct DisplayBridge {
    current: Mutex<Option<Arc<DisplaySurface>>>,
    last_tick: Mutex<Option<Duration>>,
    presented: AtomicU64,
}

impl DisplayBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface currently shown, if any
    pub fn current(&self) -> Option<Arc<DisplaySurface>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current surface (UI thread only)
    ///
    /// Returns true if the displayed source changed, in which case the caller
    /// raises the display-source-changed event.
    pub fn publish(&self, surface: Option<Arc<DisplaySurface>>) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let unchanged = match (current.as_ref(), surface.as_ref()) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        if unchanged {
            return false;
        }
        *current = surface;
        true
    }

    /// Handle one display refresh tick
    ///
    /// `tick` is the refresh driver's frame timestamp; a repeated timestamp is
    /// ignored. Returns the surface to redraw when a new frame arrived since
    /// the last presentation.
    pub fn on_refresh_tick(&self, tick: Duration) -> Option<Presentation> {
        {
            let mut last = self.last_tick.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == Some(tick) {
                return None;
            }
            *last = Some(tick);
        }

        let surface = self.current()?;
        if !surface.take_new_frame() {
            return None;
        }
        self.presented.fetch_add(1, Ordering::Relaxed);
        let generation = surface.generation();
        Some(Presentation {
            surface,
            generation,
        })
    }

    /// Number of presentations so far
    pub fn presented_count(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, fill: u8) -> FrameBuffer {
        FrameBuffer::packed(
            width,
            height,
            PixelFormat::Bgr24,
            vec![fill; (width * height * 3) as usize],
        )
    }

    #[test]
    fn test_stride_is_aligned() {
        let surface = DisplaySurface::new(5, 2, PixelFormat::Bgr24);
        assert_eq!(surface.stride(), 16);
        surface.with_pixels(|p| assert_eq!(p.len(), 32));
    }

    #[test]
    fn test_row_copy_when_strides_differ() {
        let surface = DisplaySurface::new(5, 2, PixelFormat::Bgr24);
        assert_eq!(surface.write_frame(&frame(5, 2, 9)), Some(1));
        surface.with_pixels(|p| {
            assert!(p[..15].iter().all(|&b| b == 9));
            assert_eq!(p[15], 0); // padding untouched
            assert!(p[16..31].iter().all(|&b| b == 9));
        });
    }

    #[test]
    fn test_straight_copy_when_strides_match() {
        let surface = DisplaySurface::new(4, 2, PixelFormat::Bgr24);
        surface.write_frame(&frame(4, 2, 3));
        surface.with_pixels(|p| assert!(p.iter().all(|&b| b == 3)));
    }

    #[test]
    fn test_mismatched_frame_rejected() {
        let surface = DisplaySurface::new(4, 2, PixelFormat::Bgr24);
        assert_eq!(surface.write_frame(&frame(8, 2, 1)), None);
        assert!(!surface.take_new_frame());
    }

    #[test]
    fn test_publish_reports_changes_only() {
        let bridge = DisplayBridge::new();
        assert!(!bridge.publish(None));
        let surface = Arc::new(DisplaySurface::new(2, 2, PixelFormat::Bgr24));
        assert!(bridge.publish(Some(Arc::clone(&surface))));
        assert!(!bridge.publish(Some(Arc::clone(&surface))));
        assert!(bridge.publish(None));
        assert!(bridge.current().is_none());
    }

    #[test]
    fn test_latest_frame_wins_and_duplicate_ticks_ignored() {
        let bridge = DisplayBridge::new();
        let surface = Arc::new(DisplaySurface::new(2, 2, PixelFormat::Bgr24));
        bridge.publish(Some(Arc::clone(&surface)));

        // No frame yet
        assert!(bridge.on_refresh_tick(Duration::from_millis(16)).is_none());

        // Two frames before one tick: only the second is presented
        surface.write_frame(&frame(2, 2, 1));
        surface.write_frame(&frame(2, 2, 2));
        let shown = bridge.on_refresh_tick(Duration::from_millis(32)).unwrap();
        assert_eq!(shown.generation, 2);
        shown.surface.with_pixels(|p| assert_eq!(p[0], 2));

        // Same frame is never presented twice
        assert!(bridge.on_refresh_tick(Duration::from_millis(48)).is_none());

        // A repeated tick timestamp is ignored even with a new frame pending
        surface.write_frame(&frame(2, 2, 3));
        assert!(bridge.on_refresh_tick(Duration::from_millis(48)).is_none());
        assert_eq!(
            bridge.on_refresh_tick(Duration::from_millis(64)).map(|p| p.generation),
            Some(3)
        );
        assert_eq!(bridge.presented_count(), 2);
    }
}
