// SPDX-License-Identifier: GPL-3.0-only

//! Outward event callbacks
//!
//! Every callback is invoked on the UI thread.

use crate::pipelines::display::DisplaySurface;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Called when the displayed surface is replaced or cleared
pub type DisplaySourceCallback = Arc<dyn Fn(Option<Arc<DisplaySurface>>) + Send + Sync>;

/// Called with the path of a newly written file
pub type AssetCallback = Arc<dyn Fn(&Path) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    display_source_changed: Option<DisplaySourceCallback>,
    new_image: Option<AssetCallback>,
    new_video: Option<AssetCallback>,
}

/// Registered outward callbacks
#[derive(Default)]
pub struct EventHub {
    callbacks: RwLock<Callbacks>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut Callbacks)) {
        f(&mut self.callbacks.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn set_display_source_changed(&self, callback: Option<DisplaySourceCallback>) {
        self.update(|c| c.display_source_changed = callback);
    }

    pub fn set_new_image(&self, callback: Option<AssetCallback>) {
        self.update(|c| c.new_image = callback);
    }

    pub fn set_new_video(&self, callback: Option<AssetCallback>) {
        self.update(|c| c.new_video = callback);
    }

    /// Drop every callback
    pub fn clear(&self) {
        self.update(|c| *c = Callbacks::default());
    }

    pub fn emit_display_source_changed(&self, surface: Option<Arc<DisplaySurface>>) {
        // Clone out so a callback can re-register without deadlocking
        let callback = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .display_source_changed
            .clone();
        debug!(has_surface = surface.is_some(), "Display source changed");
        if let Some(callback) = callback {
            callback(surface);
        }
    }

    pub fn emit_new_image(&self, path: &Path) {
        let callback = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .new_image
            .clone();
        if let Some(callback) = callback {
            callback(path);
        }
    }

    pub fn emit_new_video(&self, path: &Path) {
        let callback = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .new_video
            .clone();
        if let Some(callback) = callback {
            callback(path);
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub").finish_non_exhaustive()
    }
}
