// SPDX-License-Identifier: GPL-3.0-only

//! Wall-clock frame pacing for recordings
//!
//! Output frame `n` belongs at `n / fps` seconds after the first frame. Each
//! arriving frame is mapped to the output index its arrival time falls in, so
//! the recording's playback duration follows elapsed time rather than the
//! number of frames the device delivered.

use crate::constants::FramePacing;
use std::ops::Range;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct FramePacer {
    fps: u32,
    policy: FramePacing,
    started_at: Option<Instant>,
    last_index: Option<u64>,
}

impl FramePacer {
    pub fn new(fps: u32, policy: FramePacing) -> Self {
        Self {
            fps: fps.max(1),
            policy,
            started_at: None,
            last_index: None,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Highest output index handed out so far
    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }

    /// Anchor the timeline at the first frame, which takes index 0
    pub fn start(&mut self, at: Instant) -> u64 {
        self.started_at = Some(at);
        self.last_index = Some(0);
        0
    }

    /// Output index that a frame arriving at `at` falls in
    pub fn target_index(&self, at: Instant) -> u64 {
        let Some(start) = self.started_at else {
            return 0;
        };
        let elapsed = at.saturating_duration_since(start);
        (elapsed.as_nanos() * self.fps as u128 / 1_000_000_000) as u64
    }

    /// Output indices to write for a frame arriving at `at`
    ///
    /// Empty while the target index has not moved past the last one written.
    /// With [`FramePacing::Drop`] at most one index is returned; with
    /// [`FramePacing::Fill`] every skipped index is returned as well.
    pub fn advance(&mut self, at: Instant) -> Range<u64> {
        let Some(last) = self.last_index else {
            return self.start(at)..1;
        };
        let target = self.target_index(at);
        if target <= last {
            return 0..0;
        }
        self.last_index = Some(target);
        match self.policy {
            FramePacing::Drop => target..target + 1,
            FramePacing::Fill => last + 1..target + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_frame_is_index_zero() {
        let mut pacer = FramePacer::new(16, FramePacing::Drop);
        let t0 = Instant::now();
        assert_eq!(pacer.advance(t0), 0..1);
        assert!(pacer.is_started());
    }

    #[test]
    fn test_drop_holds_rate() {
        let mut pacer = FramePacer::new(16, FramePacing::Drop);
        let t0 = Instant::now();
        pacer.start(t0);
        // 10 ms later is still inside frame 0
        assert!(pacer.advance(t0 + Duration::from_millis(10)).is_empty());
        // 62.5 ms is the start of frame 1
        assert_eq!(pacer.advance(t0 + Duration::from_micros(62_500)), 1..2);
        // A 300 ms stall jumps straight to frame 5
        assert_eq!(pacer.advance(t0 + Duration::from_millis(340)), 5..6);
        assert_eq!(pacer.last_index(), Some(5));
    }

    #[test]
    fn test_fill_covers_gaps() {
        let mut pacer = FramePacer::new(16, FramePacing::Fill);
        let t0 = Instant::now();
        pacer.start(t0);
        assert_eq!(pacer.advance(t0 + Duration::from_millis(340)), 1..6);
        assert!(pacer.advance(t0 + Duration::from_millis(350)).is_empty());
    }

    #[test]
    fn test_earlier_timestamp_never_rewinds() {
        let mut pacer = FramePacer::new(16, FramePacing::Drop);
        let t0 = Instant::now();
        pacer.start(t0 + Duration::from_millis(100));
        assert!(pacer.advance(t0).is_empty());
        assert_eq!(pacer.last_index(), Some(0));
    }
}
