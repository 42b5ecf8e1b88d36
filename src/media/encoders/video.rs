// SPDX-License-Identifier: GPL-3.0-only

//! Video writers for the recording sink
//!
//! A [`VideoWriterFactory`] opens one writer per recording. Frames arrive with
//! an explicit output index; indices only ever increase, but may skip values
//! when the pacing policy drops frames.

use crate::errors::RecordingError;
use crate::media::frame::FrameBuffer;
use image::ImageEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One open video file
pub trait VideoWriter: Send {
    /// Write `frame` at output position `index`
    fn write_frame(&mut self, frame: &FrameBuffer, index: u64) -> Result<(), RecordingError>;

    /// Flush and close the file, returning its path
    fn finish(self: Box<Self>) -> Result<PathBuf, RecordingError>;
}

/// Opens video writers
pub trait VideoWriterFactory: Send + Sync {
    /// File extension (without dot) appended to recording names
    fn extension(&self) -> &str;

    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>, RecordingError>;
}

/// Metadata written next to the frames of a frame-sequence recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Number of frame files written
    pub frames: u64,
    /// Highest output index written
    pub last_index: Option<u64>,
}

/// Name of the manifest file inside a frame-sequence directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Writes each frame as a numbered JPEG inside a `.frames` directory
///
/// The file name of every frame is its zero-padded output index, so a
/// sequence can be muxed later at the recorded frame rate with gaps intact.
#[derive(Debug, Clone, Copy)]
pub struct FrameSequenceFactory {
    quality: u8,
}

impl FrameSequenceFactory {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for FrameSequenceFactory {
    fn default() -> Self {
        Self::new(90)
    }
}

impl VideoWriterFactory for FrameSequenceFactory {
    fn extension(&self) -> &str {
        "frames"
    }

    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>, RecordingError> {
        fs::create_dir_all(path).map_err(|e| RecordingError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), width, height, fps, "Opened frame sequence");
        Ok(Box::new(FrameSequenceWriter {
            dir: path.to_path_buf(),
            quality: self.quality,
            manifest: SequenceManifest {
                width,
                height,
                fps,
                frames: 0,
                last_index: None,
            },
        }))
    }
}

struct FrameSequenceWriter {
    dir: PathBuf,
    quality: u8,
    manifest: SequenceManifest,
}

impl FrameSequenceWriter {
    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{:08}.jpg", index))
    }
}

impl VideoWriter for FrameSequenceWriter {
    fn write_frame(&mut self, frame: &FrameBuffer, index: u64) -> Result<(), RecordingError> {
        let write_err = |message: String| RecordingError::Write { index, message };

        let file = File::create(self.frame_path(index)).map_err(|e| write_err(e.to_string()))?;
        let rgb = frame.to_rgb();
        image::codecs::jpeg::JpegEncoder::new_with_quality(BufWriter::new(file), self.quality)
            .write_image(
                &rgb,
                frame.width,
                frame.height,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| write_err(e.to_string()))?;

        self.manifest.frames += 1;
        self.manifest.last_index = Some(index);
        if index % 100 == 0 {
            debug!(index, dir = %self.dir.display(), "Frame sequence progress");
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, RecordingError> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        let finalize_err = |message: String| RecordingError::Finalize {
            path: manifest_path.clone(),
            message,
        };
        let json =
            serde_json::to_vec_pretty(&self.manifest).map_err(|e| finalize_err(e.to_string()))?;
        fs::write(&manifest_path, json).map_err(|e| finalize_err(e.to_string()))?;
        info!(
            path = %self.dir.display(),
            frames = self.manifest.frames,
            "Finalized frame sequence"
        );
        Ok(self.dir)
    }
}

/// Read the manifest of a finished frame-sequence recording
pub fn read_manifest(dir: &Path) -> std::io::Result<SequenceManifest> {
    let data = fs::read(dir.join(MANIFEST_FILE))?;
    serde_json::from_slice(&data).map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::PixelFormat;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tether-seq-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_sequence_writes_indexed_frames_and_manifest() {
        let root = temp_dir();
        let path = root.join("clip.frames");
        let factory = FrameSequenceFactory::default();
        assert_eq!(factory.extension(), "frames");

        let mut writer = factory.open(&path, 4, 2, 16).unwrap();
        let frame = FrameBuffer::packed(4, 2, PixelFormat::Bgr24, vec![128; 24]);
        writer.write_frame(&frame, 0).unwrap();
        writer.write_frame(&frame, 3).unwrap();
        let finished = writer.finish().unwrap();

        assert_eq!(finished, path);
        assert!(path.join("00000000.jpg").exists());
        assert!(path.join("00000003.jpg").exists());
        assert!(!path.join("00000001.jpg").exists());

        let manifest = read_manifest(&path).unwrap();
        assert_eq!(manifest.frames, 2);
        assert_eq!(manifest.last_index, Some(3));
        assert_eq!(manifest.fps, 16);

        let _ = fs::remove_dir_all(root);
    }
}
