// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for capture loops
//!
//! A loop thread moves through four states:
//!
//! ```text
//! RUNNING ──request_stop──► STOP_REQUESTED ──► EXITING ──► EXITED
//!    ▲                            │                 │
//!    └──────────try_resume────────┘◄── (restarted) ─┘
//! ```
//!
//! `try_resume` revives a loop that has been asked to stop but has not begun
//! exiting, so a stop immediately followed by a start never leaves a gap and
//! never produces a second thread. Once a loop reaches `EXITED` a new
//! controller must be started.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

const RUNNING: u8 = 0;
const STOP_REQUESTED: u8 = 1;
const EXITING: u8 = 2;
const EXITED: u8 = 3;

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

struct LoopShared {
    state: AtomicU8,
    /// Bumped by every resume attempt; a loop that sees it move while
    /// exiting stays alive instead
    starts: AtomicU64,
}

impl LoopShared {
    fn try_exit(&self, epoch: u64) -> bool {
        let from = self.state.load(Ordering::SeqCst);
        if from != RUNNING && from != STOP_REQUESTED {
            return false;
        }
        if self
            .state
            .compare_exchange(from, EXITING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.starts.load(Ordering::SeqCst) != epoch {
            self.state.store(RUNNING, Ordering::SeqCst);
            return false;
        }
        true
    }
}

/// Handle on one capture thread
///
/// ```ignore
/// let controller = CaptureLoopController::start_with_init(
///     "live-view",
///     || wait_for_routing(),
///     |buffer| match download_and_decode(buffer) {
///         Some(frame) => {
///             publish(frame);
///             LoopAction::Continue
///         }
///         None if routed() => LoopAction::Continue,
///         None => LoopAction::Stop,
///     },
///     || publish_no_image(),
/// );
///
/// controller.request_stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    shared: Arc<LoopShared>,
    name: String,
}

impl CaptureLoopController {
    /// Run `loop_fn` on a new thread until it returns [`LoopAction::Stop`]
    /// or a stop is requested
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, || Ok(()), move |_: &mut ()| loop_fn(), || {})
    }

    /// Start a capture loop with initialization and an exit hook
    ///
    /// `init_fn` runs once on the loop thread. If it fails the loop body never
    /// runs. `exit_fn` runs exactly once, on the loop thread, after the last
    /// iteration (or after a failed init) and before the loop reports
    /// itself exited.
    pub fn start_with_init<S, I, F, E>(name: &str, init_fn: I, mut loop_fn: F, exit_fn: E) -> Self
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(LoopShared {
            state: AtomicU8::new(RUNNING),
            starts: AtomicU64::new(0),
        });
        let thread_shared = Arc::clone(&shared);
        let name_clone = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Capture loop thread started, initializing...");

                match init_fn() {
                    Ok(mut state) => loop {
                        let epoch = thread_shared.starts.load(Ordering::SeqCst);
                        let action = if thread_shared.state.load(Ordering::SeqCst) == STOP_REQUESTED
                        {
                            debug!(name = %name_clone, "Stop signal received");
                            LoopAction::Stop
                        } else {
                            loop_fn(&mut state)
                        };

                        if action == LoopAction::Continue {
                            continue;
                        }
                        if thread_shared.try_exit(epoch) {
                            break;
                        }
                        debug!(name = %name_clone, "Loop resumed while stopping");
                    },
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Initialization failed");
                        thread_shared.state.store(EXITING, Ordering::SeqCst);
                    }
                }

                exit_fn();
                thread_shared.state.store(EXITED, Ordering::SeqCst);
                info!(name = %name_clone, "Capture loop thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn capture loop thread");
                shared.state.store(EXITED, Ordering::SeqCst);
                None
            }
        };

        Self {
            thread_handle,
            shared,
            name: name.to_string(),
        }
    }

    /// Check if the loop has not exited yet
    pub fn is_running(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) != EXITED
    }

    /// Keep the loop alive, cancelling a pending stop request
    ///
    /// Returns false if the loop already exited; the caller must start a new
    /// controller. Waits briefly while the loop is running its exit hook.
    pub fn try_resume(&self) -> bool {
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        loop {
            match self.shared.state.load(Ordering::SeqCst) {
                RUNNING => return true,
                STOP_REQUESTED => {
                    if self
                        .shared
                        .state
                        .compare_exchange(STOP_REQUESTED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        debug!(name = %self.name, "Capture loop resumed");
                        return true;
                    }
                }
                EXITING => thread::yield_now(),
                _ => return false,
            }
        }
    }

    /// Ask the loop to end after its current iteration
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        let _ = self.shared.state.compare_exchange(
            RUNNING,
            STOP_REQUESTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Request a stop and join
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Join the thread; the loop must end on its own
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Capture loop thread finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    /// Dropping never blocks; the loop may be waiting on the UI thread that
    /// drops it
    fn drop(&mut self) {
        if self.thread_handle.is_none() {
            return;
        }
        self.request_stop();
        if self.shared.state.load(Ordering::SeqCst) == EXITED {
            self.join();
        } else {
            debug!(name = %self.name, "CaptureLoopController dropped, detaching loop");
        }
    }
}
