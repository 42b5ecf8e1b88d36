// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide serialization of device calls
//!
//! The vendor library is not safe for concurrent use. Every gateway call made
//! by any thread goes through [`DeviceLock::with`]. The lock is not reentrant:
//! code running inside `with` must never call back into it, and notification
//! handlers take it themselves.

use super::DeviceGateway;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, serialized access to the device gateway
#[derive(Clone)]
pub struct DeviceLock {
    gateway: Arc<Mutex<Box<dyn DeviceGateway>>>,
}

impl DeviceLock {
    pub fn new<G: DeviceGateway + 'static>(gateway: G) -> Self {
        Self::from_boxed(Box::new(gateway))
    }

    pub fn from_boxed(gateway: Box<dyn DeviceGateway>) -> Self {
        Self {
            gateway: Arc::new(Mutex::new(gateway)),
        }
    }

    /// Run `f` with exclusive access to the gateway
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn DeviceGateway) -> R) -> R {
        // A panic inside a previous call leaves the gateway usable
        let mut guard = self.gateway.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_mut())
    }
}

impl std::fmt::Debug for DeviceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLock").finish_non_exhaustive()
    }
}
