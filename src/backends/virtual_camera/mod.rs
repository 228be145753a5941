// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera output backend
//!
//! Writes relay frames to a v4l2loopback device so that conferencing
//! applications can consume them as an ordinary camera. Requires the
//! `v4l2loopback` kernel module:
//!
//! ```bash
//! sudo modprobe v4l2loopback devices=1 card_label="VCM Camera"
//! ```
//!
//! Consumer detection works by scanning `/proc/*/fd` for other processes
//! holding the loopback node open; v4l2loopback itself does not expose a
//! reader count. The scan result is cached for a short interval so the
//! relay loop can query it every cycle without touching `/proc` at 30Hz.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use v4l::FourCC;
use v4l::video::Output;

use crate::backends::camera::types::Frame;
use crate::constants::{timing, virtual_camera};
use crate::errors::{RelayError, RelayResult};

/// Abstraction over a virtual output device
///
/// Owned exclusively by the relay loop; `initialize()` runs on the worker
/// thread so that a fatal failure ends only the worker. Tests substitute a
/// scripted mock.
pub trait FrameSink: Send {
    /// Create the virtual device with the sink's fixed geometry.
    /// Failure is fatal to the relay loop.
    fn initialize(&mut self) -> RelayResult<()>;

    /// Non-blocking query: does any downstream consumer hold the device open?
    fn is_connected(&mut self) -> bool;

    /// Block up to `timeout` for a consumer to attach. Returns the
    /// connection state at exit. Never blocks unboundedly.
    fn wait_for_connection(&mut self, timeout: Duration) -> bool;

    /// Deliver one frame whose geometry exactly matches the sink's
    fn send_frame(&mut self, frame: &Frame) -> RelayResult<()>;

    /// Idempotent teardown
    fn close(&mut self);
}

/// Cached consumer-connection state
struct ConnectionProbe {
    connected: bool,
    probed_at: Option<Instant>,
}

impl ConnectionProbe {
    fn new() -> Self {
        Self {
            connected: false,
            probed_at: None,
        }
    }

    fn is_fresh(&self) -> bool {
        self.probed_at
            .map(|t| t.elapsed() < virtual_camera::CONNECTION_CACHE_TTL)
            .unwrap_or(false)
    }

    fn update(&mut self, connected: bool) {
        self.connected = connected;
        self.probed_at = Some(Instant::now());
    }
}

/// v4l2loopback implementation of [`FrameSink`]
pub struct V4l2LoopbackSink {
    /// Explicitly configured device path; `None` means auto-discover
    configured_path: Option<PathBuf>,
    /// Resolved path once initialized
    path: Option<PathBuf>,
    device: Option<File>,
    width: u32,
    height: u32,
    frames_written: u64,
    probe: ConnectionProbe,
}

impl V4l2LoopbackSink {
    /// Create an uninitialized sink with the fixed output geometry
    pub fn new(configured_path: Option<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            configured_path,
            path: None,
            device: None,
            width,
            height,
            frames_written: 0,
            probe: ConnectionProbe::new(),
        }
    }

    /// Best-effort format setup on the loopback node.
    ///
    /// v4l2loopback frequently auto-negotiates from the first write, so a
    /// failed set_format is a warning, not an error.
    fn set_format(&self, path: &Path) {
        let device = match v4l::Device::with_path(path) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "Could not reopen loopback node for format setup");
                return;
            }
        };

        let fmt = v4l::Format::new(self.width, self.height, FourCC::new(b"RGB3"));
        match Output::set_format(&device, &fmt) {
            Ok(applied) => debug!(
                width = applied.width,
                height = applied.height,
                fourcc = %applied.fourcc,
                "Set loopback output format"
            ),
            Err(e) => warn!(error = %e, "Could not set loopback format (may still work)"),
        }
    }

    /// Scan `/proc/*/fd` for another process holding `path` open
    fn probe_consumers(path: &Path) -> bool {
        let own_pid = std::process::id();

        let entries = match fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(_) => return false,
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Ok(pid) = name.to_string_lossy().parse::<u32>() else {
                continue;
            };
            if pid == own_pid {
                continue;
            }

            let fd_dir = format!("/proc/{}/fd", pid);
            let Ok(fds) = fs::read_dir(&fd_dir) else {
                // Foreign-user processes are unreadable; they cannot hold
                // our video group device anyway in the common setup
                continue;
            };

            for fd in fds.flatten() {
                if let Ok(target) = fs::read_link(fd.path())
                    && target == path
                {
                    return true;
                }
            }
        }

        false
    }
}

impl FrameSink for V4l2LoopbackSink {
    fn initialize(&mut self) -> RelayResult<()> {
        if self.device.is_some() {
            return Ok(());
        }

        let path = match &self.configured_path {
            Some(p) => p.clone(),
            None => find_loopback_devices().into_iter().next().ok_or_else(|| {
                RelayError::FatalInit(
                    "no v4l2loopback device found (is the kernel module loaded?)".into(),
                )
            })?,
        };

        info!(
            path = %path.display(),
            width = self.width,
            height = self.height,
            "Initializing virtual camera"
        );

        if !path.exists() {
            return Err(RelayError::FatalInit(format!(
                "loopback device {} does not exist",
                path.display()
            )));
        }

        let file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                RelayError::FatalInit(format!(
                    "permission denied for {}, try adding the user to the 'video' group",
                    path.display()
                ))
            } else {
                RelayError::FatalInit(format!("open {}: {}", path.display(), e))
            }
        })?;

        self.set_format(&path);

        self.device = Some(file);
        // /proc fd links point at the resolved node, so store the real path
        self.path = Some(fs::canonicalize(&path).unwrap_or(path));
        info!("Virtual camera initialized");
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        let Some(path) = self.path.clone() else {
            return false;
        };

        if !self.probe.is_fresh() {
            self.probe.update(Self::probe_consumers(&path));
        }
        self.probe.connected
    }

    fn wait_for_connection(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_connected() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(virtual_camera::CONNECTION_POLL_STEP));
        }
    }

    fn send_frame(&mut self, frame: &Frame) -> RelayResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| RelayError::SendFault("virtual camera not initialized".into()))?;

        if !frame.matches_size(self.width, self.height) {
            // Callers normalize before sending; reaching this is a bug
            return Err(RelayError::SendFault(format!(
                "frame {}x{} does not match sink {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        device
            .write_all(&frame.data)
            .map_err(|e| RelayError::SendFault(format!("write: {}", e)))?;

        self.frames_written += 1;
        if self.frames_written % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frames = self.frames_written, "Frames delivered to virtual camera");
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            info!(
                frames = self.frames_written,
                "Closing virtual camera"
            );
        }
        self.path = None;
    }
}

impl Drop for V4l2LoopbackSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Find v4l2loopback devices on the system
///
/// Scans `/dev/video*` and checks the device name via sysfs. v4l2loopback
/// nodes report "Dummy video device" by default or whatever `card_label`
/// was given at module load; OBS installs commonly label theirs "OBS".
pub fn find_loopback_devices() -> Vec<PathBuf> {
    // Skip the scan entirely when the module is verifiably absent
    if let Ok(modules) = fs::read_to_string("/proc/modules")
        && !modules.contains("v4l2loopback")
    {
        return Vec::new();
    }

    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };

    let mut video_devices: Vec<_> = entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("video"))
        .collect();
    video_devices.sort_by_key(|e| e.file_name());

    let mut found = Vec::new();
    for entry in video_devices {
        let name = entry.file_name();
        let Some(device_num) = name.to_string_lossy().strip_prefix("video").map(String::from)
        else {
            continue;
        };

        let sysfs_name = format!("/sys/class/video4linux/video{}/name", device_num);
        if let Ok(device_name) = fs::read_to_string(&sysfs_name) {
            let device_name = device_name.trim();
            if device_name.contains("Dummy video device")
                || device_name.to_lowercase().contains("loopback")
                || device_name.to_lowercase().contains("virtual")
                || device_name.contains("OBS")
            {
                found.push(entry.path());
            }
        }
    }

    found
}
