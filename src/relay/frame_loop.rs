// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for the relay loop
//!
//! Provides a standardized way to run a per-cycle loop body on a dedicated
//! worker thread with a level-triggered stop signal, a fallible one-shot
//! initialization step, and a bounded join on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::constants::timing;

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Sleep for `duration`, waking early when the stop signal is set.
///
/// Every suspension point in the relay loop sleeps through this helper so
/// shutdown latency stays bounded by [`timing::STOP_POLL_INTERVAL`].
pub fn interruptible_sleep(stop: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(timing::STOP_POLL_INTERVAL));
    }
}

/// Controller for a relay loop running on a dedicated worker thread
///
/// The worker runs an initialization closure once; on success the loop
/// closure is called repeatedly until it returns [`LoopAction::Stop`] or the
/// stop signal is raised. Initialization failure ends the worker without the
/// loop ever running.
pub struct LoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl LoopController {
    /// Start a worker with a fallible initialization step.
    ///
    /// `init_fn` builds the loop state; `loop_fn` performs one iteration and
    /// receives the stop signal so that long operations inside an iteration
    /// can remain interruptible.
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> Self
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S, &AtomicBool) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting relay worker");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Worker thread started, initializing...");

            let mut state = match init_fn() {
                Ok(s) => {
                    debug!(name = %name_clone, "Initialization successful");
                    s
                }
                Err(e) => {
                    error!(name = %name_clone, error = %e, "Initialization failed");
                    return;
                }
            };

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                match loop_fn(&mut state, &stop_signal_clone) {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }
            }

            info!(name = %name_clone, "Worker thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the worker is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the worker to stop (non-blocking, level-triggered)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting worker stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Wait up to `timeout` for the worker thread to finish.
    ///
    /// Returns true when the thread terminated within the timeout. A worker
    /// that fails to terminate is logged and left detached rather than
    /// blocking the caller forever.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.thread_handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                error!(name = %self.name, ?timeout, "Worker thread did not terminate in time");
                self.thread_handle = Some(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }

        if handle.join().is_err() {
            warn!(name = %self.name, "Worker thread panicked");
        } else {
            debug!(name = %self.name, "Worker thread finished");
        }
        true
    }

    /// Stop the worker and wait for it with the standard timeout
    pub fn stop(&mut self) -> bool {
        self.request_stop();
        self.join_timeout(timing::WORKER_JOIN_TIMEOUT)
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "LoopController dropped, stopping worker");
            self.stop();
        }
    }
}
