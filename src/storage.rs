// SPDX-License-Identifier: GPL-3.0-only

//! Output locations and file naming for pictures and recordings

use crate::constants::{DEFAULT_SAVE_FOLDER, IMAGE_NAME_PREFIX};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Caller-supplied file stem generator
///
/// Invoked once per output file; the extension is appended by the caller.
pub type NamingRule = Arc<dyn Fn() -> String + Send + Sync>;

/// Kind of file received from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    /// Classify a device file by name
    ///
    /// The device names still images with an `IMG` prefix; everything else is
    /// treated as video.
    pub fn classify(device_name: &str) -> Self {
        let is_image = device_name
            .get(..IMAGE_NAME_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(IMAGE_NAME_PREFIX));
        if is_image {
            AssetKind::Image
        } else {
            AssetKind::Video
        }
    }
}

/// Where pictures and recordings are written
#[derive(Clone)]
pub struct OutputLocations {
    pub image_dir: PathBuf,
    pub video_dir: PathBuf,
    pub naming: Option<NamingRule>,
}

impl OutputLocations {
    pub fn new(image_dir: PathBuf, video_dir: PathBuf) -> Self {
        Self {
            image_dir,
            video_dir,
            naming: None,
        }
    }

    pub fn dir_for(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Image => &self.image_dir,
            AssetKind::Video => &self.video_dir,
        }
    }
}

impl Default for OutputLocations {
    fn default() -> Self {
        Self::new(default_image_dir(), default_video_dir())
    }
}

impl fmt::Debug for OutputLocations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputLocations")
            .field("image_dir", &self.image_dir)
            .field("video_dir", &self.video_dir)
            .field("naming", &self.naming.is_some())
            .finish()
    }
}

/// Output locations shared between the controller and its workers
#[derive(Debug, Clone, Default)]
pub struct SharedLocations(Arc<RwLock<OutputLocations>>);

impl SharedLocations {
    pub fn new(locations: OutputLocations) -> Self {
        Self(Arc::new(RwLock::new(locations)))
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> OutputLocations {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut OutputLocations)) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

/// Default directory for pictures
pub fn default_image_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Default directory for recordings
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// File stem from the current time in milliseconds since the Unix epoch
pub fn epoch_millis_name() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Split a device file name into stem and lowercased extension
///
/// The split happens at the first dot, so `IMG_0001.JPG` becomes
/// `("IMG_0001", "jpg")`.
pub fn split_device_name(name: &str) -> (&str, String) {
    match name.split_once('.') {
        Some((stem, ext)) => (stem, ext.to_lowercase()),
        None => (name, String::new()),
    }
}

/// Build the output path for a new file, creating `dir` if needed
///
/// The stem comes from `naming` when set, otherwise from `fallback_stem`.
/// An existing file is never reused: `stem-1`, `stem-2`, ... are tried until
/// a free name is found.
pub fn resolve_output_path(
    dir: &Path,
    naming: Option<&NamingRule>,
    fallback_stem: &str,
    extension: &str,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stem = match naming {
        Some(rule) => rule(),
        None => fallback_stem.to_string(),
    };
    let file_name = |suffix: Option<u32>| {
        let stem = match suffix {
            Some(n) => format!("{}-{}", stem, n),
            None => stem.clone(),
        };
        if extension.is_empty() {
            stem
        } else {
            format!("{}.{}", stem, extension)
        }
    };

    let mut path = dir.join(file_name(None));
    let mut suffix = 0;
    while path.symlink_metadata().is_ok() {
        suffix += 1;
        path = dir.join(file_name(Some(suffix)));
    }
    debug!(path = %path.display(), "Resolved output path");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prefix_case_insensitive() {
        assert_eq!(AssetKind::classify("IMG_0001.JPG"), AssetKind::Image);
        assert_eq!(AssetKind::classify("img_0002.jpg"), AssetKind::Image);
        assert_eq!(AssetKind::classify("MVI_0003.MOV"), AssetKind::Video);
        assert_eq!(AssetKind::classify("IM"), AssetKind::Video);
    }

    #[test]
    fn test_split_device_name() {
        assert_eq!(split_device_name("IMG_0001.JPG"), ("IMG_0001", "jpg".to_string()));
        assert_eq!(split_device_name("MVI_1.MOV"), ("MVI_1", "mov".to_string()));
        assert_eq!(split_device_name("README"), ("README", String::new()));
    }

    #[test]
    fn test_resolve_uses_naming_rule() {
        let dir = std::env::temp_dir().join(format!("tether-storage-{}", uuid::Uuid::new_v4()));
        let rule: NamingRule = Arc::new(|| "custom".to_string());

        let named = resolve_output_path(&dir, Some(&rule), "IMG_0001", "jpg").unwrap();
        assert_eq!(named, dir.join("custom.jpg"));
        assert!(dir.is_dir());

        let fallback = resolve_output_path(&dir, None, "IMG_0001", "jpg").unwrap();
        assert_eq!(fallback, dir.join("IMG_0001.jpg"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_resolve_never_reuses_existing_name() {
        let dir = std::env::temp_dir().join(format!("tether-storage-{}", uuid::Uuid::new_v4()));
        let rule: NamingRule = Arc::new(|| "portrait".to_string());

        let first = resolve_output_path(&dir, Some(&rule), "IMG_0001", "jpg").unwrap();
        std::fs::write(&first, b"first").unwrap();
        let second = resolve_output_path(&dir, Some(&rule), "IMG_0002", "jpg").unwrap();
        std::fs::write(&second, b"second").unwrap();
        let third = resolve_output_path(&dir, Some(&rule), "IMG_0003", "jpg").unwrap();

        assert_eq!(first, dir.join("portrait.jpg"));
        assert_eq!(second, dir.join("portrait-1.jpg"));
        assert_eq!(third, dir.join("portrait-2.jpg"));
        assert_eq!(std::fs::read(&first).unwrap(), b"first");

        // Recordings are directories; they count as taken too
        std::fs::create_dir(dir.join("clip.frames")).unwrap();
        let clip = resolve_output_path(&dir, None, "clip", "frames").unwrap();
        assert_eq!(clip, dir.join("clip-1.frames"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_epoch_millis_name_is_numeric() {
        let name = epoch_millis_name();
        assert!(name.parse::<i64>().is_ok());
    }
}
