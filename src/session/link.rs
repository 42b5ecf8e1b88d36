// SPDX-License-Identifier: GPL-3.0-only

//! Session state shared with the capture loop and notification handlers

use crate::backends::camera::{CameraPropertySet, DeviceHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
struct Attached {
    handle: DeviceHandle,
    name: String,
}

/// The live device connection, if any
#[derive(Debug, Default)]
pub struct SessionLink {
    attached: Mutex<Option<Attached>>,
    open: AtomicBool,
    properties: Mutex<CameraPropertySet>,
}

impl SessionLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Option<DeviceHandle> {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.handle)
    }

    pub fn device_name(&self) -> Option<String> {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.name.clone())
            .filter(|name| !name.is_empty())
    }

    /// Record a located device; its session is not open yet
    pub fn attach(&self, handle: DeviceHandle) {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = Some(Attached {
            handle,
            name: String::new(),
        });
    }

    pub fn set_device_name(&self, name: String) {
        if let Some(attached) = self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            attached.name = name;
        }
    }

    /// Forget the device, returning its handle for release
    ///
    /// Also marks the session closed and resets the property mirror.
    pub fn detach(&self) -> Option<DeviceHandle> {
        self.open.store(false, Ordering::SeqCst);
        *self.properties.lock().unwrap_or_else(PoisonError::into_inner) =
            CameraPropertySet::default();
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|a| a.handle)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Run `f` against the property mirror
    pub fn properties<R>(&self, f: impl FnOnce(&mut CameraPropertySet) -> R) -> R {
        f(&mut self.properties.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn routes_to_host(&self) -> bool {
        self.properties(|p| p.routes_to_host())
    }
}
