// SPDX-License-Identifier: GPL-3.0-only

//! Session registry
//!
//! Device notifications carry a [`ContextToken`] rather than a pointer to the
//! controller. Handlers resolve the token here; a controller that has been
//! disposed (or dropped) simply resolves to nothing.

use super::CameraInner;
use crate::backends::camera::ContextToken;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Maps context tokens to live controllers
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ContextToken, Weak<CameraInner>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, token: ContextToken, inner: &Arc<CameraInner>) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, Arc::downgrade(inner));
    }

    pub(crate) fn lookup(&self, token: ContextToken) -> Option<Arc<CameraInner>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(&token).map(Weak::upgrade) {
            Some(Some(inner)) => Some(inner),
            Some(None) => {
                // Controller dropped without dispose
                sessions.remove(&token);
                None
            }
            None => None,
        }
    }

    pub(crate) fn remove(&self, token: ContextToken) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
    }

    /// Number of registered controllers
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}
