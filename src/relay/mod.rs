// SPDX-License-Identifier: GPL-3.0-only

//! Camera relay pipeline
//!
//! The relay worker owns a physical capture source and a virtual camera
//! sink and decides once per cadence tick what to deliver downstream:
//!
//! ```text
//! consumer_connected  feature_enabled   output
//! ------------------  ---------------   -------------------------
//! false               -                 nothing (bounded wait)
//! true                false             placeholder (black frame)
//! true                true              captured frame, normalized
//! ```
//!
//! Real video flows iff both activation flags are true; every failure on
//! the capture side degrades to the placeholder and is retried on a later
//! cycle. Only a sink initialization failure ends the worker.

pub mod frame_loop;
pub mod normalize;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backends::camera::types::{Frame, Framerate};
use crate::backends::camera::{FrameSource, V4l2FrameSource};
use crate::backends::virtual_camera::{FrameSink, V4l2LoopbackSink};
use crate::constants::timing;
use crate::state::ActivationState;

use frame_loop::{LoopAction, LoopController, interruptible_sleep};

/// Immutable configuration of one relay instance
///
/// Fixed for the lifetime of the worker; applying different values requires
/// a full stop/start cycle.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Index of the physical capture device (/dev/videoN)
    pub device_index: u32,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Target output cadence; unspecified (zero) falls back to 30fps
    pub framerate: Framerate,
    /// Explicit v4l2loopback node; `None` auto-discovers one
    pub loopback_path: Option<PathBuf>,
}

/// Per-cycle state owned by the relay worker thread
struct RelayCycle {
    config: RelayConfig,
    state: ActivationState,
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    /// Precomputed blank frame, cloned (not reallocated) whenever needed
    placeholder: Frame,
    frame_interval: Duration,
    last_connected: bool,
}

impl RelayCycle {
    /// One cadence tick of the relay state machine
    fn run(&mut self, stop: &AtomicBool) -> LoopAction {
        let cycle_start = Instant::now();

        let connected = self.sink.is_connected();
        if connected != self.last_connected {
            info!(connected, "Virtual camera consumer connection changed");
            self.last_connected = connected;
        }
        self.state.set_consumer_connected(connected);

        let outgoing = if !connected {
            if self.source.is_open() {
                debug!("Consumer detached, releasing capture device");
                self.source.release();
            }
            // Bounded wait keeps the stop signal responsive; the controller
            // re-checks it before the next cycle
            self.sink
                .wait_for_connection(timing::CONNECTION_WAIT_TIMEOUT);
            None
        } else if !self.state.feature_enabled() {
            if self.source.is_open() {
                info!("Camera disabled, releasing capture device");
                self.source.release();
            }
            Some(self.placeholder.clone())
        } else {
            Some(self.capture_frame())
        };

        if let Some(frame) = outgoing
            && let Err(e) = self.sink.send_frame(&frame)
        {
            warn!(error = %e, "Frame send fault");
            // One placeholder send as a recovery signal, then back off
            // briefly; a single send fault never ends the loop
            if let Err(e2) = self.sink.send_frame(&self.placeholder) {
                warn!(error = %e2, "Recovery placeholder send also failed");
            }
            interruptible_sleep(stop, timing::SEND_FAULT_PAUSE);
        }

        // Pace the cadence; overruns proceed immediately without catch-up
        if let Some(remaining) = self.frame_interval.checked_sub(cycle_start.elapsed()) {
            interruptible_sleep(stop, remaining);
        }

        LoopAction::Continue
    }

    /// Produce the outgoing frame while the feature is enabled: a normalized
    /// capture when the device cooperates, the placeholder otherwise.
    fn capture_frame(&mut self) -> Frame {
        if !self.source.is_open()
            && let Err(e) = self.source.open()
        {
            warn!(error = %e, "Capture device unavailable, sending placeholder");
            return self.placeholder.clone();
        }

        match self.source.read() {
            Ok(frame) => normalize::normalize(&frame, self.config.width, self.config.height),
            Err(e) => {
                warn!(error = %e, "Frame read failed, sending placeholder");
                // Release so the next cycle reopens from scratch
                self.source.release();
                self.placeholder.clone()
            }
        }
    }
}

impl Drop for RelayCycle {
    fn drop(&mut self) {
        // Best-effort teardown; the backends log their own failures
        self.source.release();
        self.sink.close();
        self.state.set_consumer_connected(false);
        info!("Relay loop finished");
    }
}

/// Manages the relay worker lifecycle
///
/// `start()` launches the worker thread; sink initialization happens on the
/// worker so that a fatal failure there ends only the worker. `stop()`
/// signals the level-triggered stop flag and joins with a bounded timeout.
pub struct RelayManager {
    config: RelayConfig,
    state: ActivationState,
    controller: Option<LoopController>,
}

impl RelayManager {
    pub fn new(config: RelayConfig, state: ActivationState) -> Self {
        Self {
            config,
            state,
            controller: None,
        }
    }

    /// Launch the relay worker against the real V4L2 devices.
    /// A second call while running is a no-op with a warning.
    pub fn start(&mut self) {
        let source = Box::new(V4l2FrameSource::new(
            self.config.device_index,
            self.config.width,
            self.config.height,
            self.config.framerate,
        ));
        let sink = Box::new(V4l2LoopbackSink::new(
            self.config.loopback_path.clone(),
            self.config.width,
            self.config.height,
        ));
        self.start_with_devices(source, sink);
    }

    /// Launch the relay worker with explicit device implementations.
    /// Exposed for tests; `start()` delegates here.
    pub fn start_with_devices(
        &mut self,
        source: Box<dyn FrameSource>,
        mut sink: Box<dyn FrameSink>,
    ) {
        if self.is_running() {
            warn!("Relay already running, ignoring start");
            return;
        }

        let config = self.config.clone();
        let state = self.state.clone();

        info!(
            device = config.device_index,
            width = config.width,
            height = config.height,
            fps = %config.framerate,
            "Starting camera relay"
        );

        let controller = LoopController::start_with_init(
            "camera-relay",
            move || {
                // Without an output target there is nothing to drive
                sink.initialize().map_err(|e| e.to_string())?;

                let placeholder = Frame::blank(config.width, config.height);
                let frame_interval = config.framerate.frame_interval();
                Ok(RelayCycle {
                    config,
                    state,
                    source,
                    sink,
                    placeholder,
                    frame_interval,
                    last_connected: false,
                })
            },
            |cycle: &mut RelayCycle, stop: &AtomicBool| cycle.run(stop),
        );

        self.controller = Some(controller);
    }

    /// Whether the worker thread is alive
    pub fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .map(|c| c.is_running())
            .unwrap_or(false)
    }

    /// Signal the worker to stop and wait for it within the standard
    /// timeout. Logs, but does not fail, when the worker lags behind.
    pub fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            info!("Stopping camera relay");
            controller.stop();
        }
    }

    /// Shared activation state driving this relay
    pub fn state(&self) -> &ActivationState {
        &self.state
    }
}

impl Drop for RelayManager {
    fn drop(&mut self) {
        self.stop();
    }
}
