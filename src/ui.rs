// SPDX-License-Identifier: GPL-3.0-only

//! UI-affinity context
//!
//! All display-surface mutation and every outward event runs on one thread,
//! the UI thread. Other threads hand work to it through a [`UiContext`]:
//!
//! - [`UiContext::post`] queues a task and returns immediately
//! - [`UiContext::send`] queues a task and waits for its result
//!
//! The host owns the [`UiDispatcher`] and either pumps it from its own event
//! loop with [`UiDispatcher::run_pending`] or hands it a thread with
//! [`UiDispatcher::spawn`].

use crate::errors::{CameraError, CameraResult};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type UiTask = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct UiThread(Mutex<Option<ThreadId>>);

impl UiThread {
    fn set_current(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
    }

    fn is_current(&self) -> bool {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }
}

/// Handle for scheduling work on the UI thread
#[derive(Clone)]
pub struct UiContext {
    sender: mpsc::UnboundedSender<UiTask>,
    ui_thread: Arc<UiThread>,
}

/// Consumer side of the UI task queue
pub struct UiDispatcher {
    receiver: mpsc::UnboundedReceiver<UiTask>,
    ui_thread: Arc<UiThread>,
}

/// Create a connected context/dispatcher pair
pub fn channel() -> (UiContext, UiDispatcher) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let ui_thread = Arc::new(UiThread::default());
    (
        UiContext {
            sender,
            ui_thread: Arc::clone(&ui_thread),
        },
        UiDispatcher {
            receiver,
            ui_thread,
        },
    )
}

impl UiContext {
    /// Whether the caller is running on the UI thread
    pub fn is_ui_thread(&self) -> bool {
        self.ui_thread.is_current()
    }

    /// Queue `task` on the UI thread without waiting
    ///
    /// Returns false if the dispatcher is gone; the task is dropped.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        if self.sender.send(Box::new(task)).is_err() {
            debug!("UI dispatcher gone, dropping posted task");
            return false;
        }
        true
    }

    /// Run `task` on the UI thread and wait for its result
    ///
    /// Runs inline when already on the UI thread. Must not be called from
    /// inside an async runtime.
    pub fn send<R, F>(&self, task: F) -> CameraResult<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_ui_thread() {
            return Ok(task());
        }

        let (tx, rx) = oneshot::channel();
        let queued = self.post(move || {
            let _ = tx.send(task());
        });
        if !queued {
            return Err(CameraError::UiUnavailable);
        }
        // Dropped without running when the dispatcher shuts down
        rx.blocking_recv().map_err(|_| CameraError::UiUnavailable)
    }
}

impl UiDispatcher {
    /// Run every task queued so far on the calling thread
    ///
    /// The calling thread becomes the UI thread. Returns the number of tasks
    /// that ran.
    pub fn run_pending(&mut self) -> usize {
        self.ui_thread.set_current();
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Run tasks until every [`UiContext`] has been dropped
    pub fn run(mut self) {
        self.ui_thread.set_current();
        while let Some(task) = self.receiver.blocking_recv() {
            task();
        }
        debug!("UI dispatcher finished");
    }

    /// Run the dispatcher on a dedicated thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("ui-dispatch".to_string())
            .spawn(move || self.run())
            .inspect_err(|e| warn!(error = %e, "Failed to spawn UI dispatcher"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_post_runs_on_pump() {
        let (ui, mut dispatcher) = channel();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            assert!(ui.post(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.run_pending(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_send_waits_for_result() {
        let (ui, dispatcher) = channel();
        let handle = dispatcher.spawn().unwrap();

        let ui_clone = ui.clone();
        let on_ui = ui.send(move || ui_clone.is_ui_thread()).unwrap();
        assert!(on_ui);
        assert!(!ui.is_ui_thread());
        assert_eq!(ui.send(|| 40 + 2).unwrap(), 42);

        drop(ui);
        handle.join().unwrap();
    }

    #[test]
    fn test_send_inline_on_ui_thread() {
        let (ui, mut dispatcher) = channel();
        dispatcher.run_pending();
        // Would deadlock if it were queued
        assert_eq!(ui.send(|| 7).unwrap(), 7);
    }

    #[test]
    fn test_closed_dispatcher_reports_unavailable() {
        let (ui, dispatcher) = channel();
        drop(dispatcher);
        assert!(!ui.post(|| {}));
        assert_eq!(ui.send(|| 1).unwrap_err(), CameraError::UiUnavailable);
    }
}
