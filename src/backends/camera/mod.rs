// SPDX-License-Identifier: GPL-3.0-only

//! Physical capture device backend
//!
//! Direct V4L2 capture via the v4l crate. The device is opened lazily by the
//! relay loop, configured best-effort (drivers are free to ignore requested
//! parameters) and released whenever no consumer needs real video, so the
//! camera LED only lights while frames are actually being relayed.

pub mod format_converters;
pub mod types;

use std::thread;

use tracing::{debug, info, warn};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::fraction::Fraction;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::parameters::Parameters;

use crate::constants::capture;
use crate::errors::{RelayError, RelayResult};

use types::{Frame, Framerate};

/// Abstraction over a physical video capture device
///
/// The relay loop owns exactly one implementation of this trait and is the
/// only caller of `read()`/`release()`. Tests substitute a scripted mock.
pub trait FrameSource: Send {
    /// Open and configure the device. Never panics; an unusable device is
    /// reported as `DeviceUnavailable` and retried on a later cycle.
    fn open(&mut self) -> RelayResult<()>;

    /// Whether a device handle is currently held
    fn is_open(&self) -> bool;

    /// Blocking read of one frame, converted to packed RGB24
    fn read(&mut self) -> RelayResult<Frame>;

    /// Release the device handle. Idempotent; safe to call when closed.
    fn release(&mut self);
}

/// An open capture session
///
/// The mmap stream keeps the device file descriptor alive internally, so the
/// `Device` handle itself does not need to be retained after stream creation.
struct OpenCapture {
    stream: MmapStream<'static>,
    fourcc: FourCC,
    width: u32,
    height: u32,
}

/// V4L2 implementation of [`FrameSource`]
pub struct V4l2FrameSource {
    device_index: u32,
    target_width: u32,
    target_height: u32,
    framerate: Framerate,
    capture: Option<OpenCapture>,
}

impl V4l2FrameSource {
    /// Create an unopened capture source for the given device index
    pub fn new(device_index: u32, width: u32, height: u32, framerate: Framerate) -> Self {
        Self {
            device_index,
            target_width: width,
            target_height: height,
            framerate,
            capture: None,
        }
    }

    /// Open the device node, retrying by explicit path when the index lookup
    /// fails (some systems renumber nodes while an index stays stable).
    fn open_device(&self) -> RelayResult<Device> {
        match Device::new(self.device_index as usize) {
            Ok(dev) => Ok(dev),
            Err(e) => {
                let path = format!("/dev/video{}", self.device_index);
                warn!(
                    index = self.device_index,
                    error = %e,
                    path = %path,
                    "Index open failed, retrying by device path"
                );
                Device::with_path(&path).map_err(|e2| {
                    RelayError::DeviceUnavailable(format!(
                        "index {} and path {} both failed: {}; {}",
                        self.device_index, path, e, e2
                    ))
                })
            }
        }
    }

    /// Negotiate format and frame interval on an open device.
    ///
    /// Both calls are best-effort: drivers may silently substitute their own
    /// values, so the actually applied format is read back and returned.
    fn negotiate(&self, device: &Device) -> RelayResult<v4l::Format> {
        let requested = v4l::Format::new(
            self.target_width,
            self.target_height,
            FourCC::new(capture::PREFERRED_FOURCC),
        );

        match device.set_format(&requested) {
            Ok(applied) => debug!(
                width = applied.width,
                height = applied.height,
                fourcc = %applied.fourcc,
                "Set capture format"
            ),
            Err(e) => warn!(error = %e, "Could not set capture format, using device default"),
        }

        if !self.framerate.is_unspecified() {
            let params = Parameters::new(Fraction::new(self.framerate.denom, self.framerate.num));
            match device.set_params(&params) {
                Ok(p) => debug!(interval = ?p.interval, "Set capture frame interval"),
                Err(e) => warn!(error = %e, "Could not set capture frame interval"),
            }
        }

        device
            .format()
            .map_err(|e| RelayError::DeviceUnavailable(format!("format readback: {}", e)))
    }
}

impl FrameSource for V4l2FrameSource {
    fn open(&mut self) -> RelayResult<()> {
        if self.capture.is_some() {
            return Ok(());
        }

        info!(
            index = self.device_index,
            width = self.target_width,
            height = self.target_height,
            fps = %self.framerate,
            "Opening capture device"
        );

        let mut device = self.open_device()?;
        let actual = self.negotiate(&device)?;

        if actual.width != self.target_width || actual.height != self.target_height {
            warn!(
                requested = format!("{}x{}", self.target_width, self.target_height),
                actual = format!("{}x{}", actual.width, actual.height),
                "Resolution mismatch, frames will be resized"
            );
        }

        // Single buffer keeps dequeue latency minimal; throughput is bounded
        // by the relay cadence anyway.
        let stream = MmapStream::with_buffers(&mut device, Type::VideoCapture, capture::BUFFER_COUNT)
            .map_err(|e| RelayError::DeviceUnavailable(format!("mmap stream: {}", e)))?;

        info!(
            width = actual.width,
            height = actual.height,
            fourcc = %actual.fourcc,
            "Capture device opened"
        );

        self.capture = Some(OpenCapture {
            stream,
            fourcc: actual.fourcc,
            width: actual.width,
            height: actual.height,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    fn read(&mut self) -> RelayResult<Frame> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| RelayError::ReadFailed("capture device not open".into()))?;

        let (buf, _meta) = capture
            .stream
            .next()
            .map_err(|e| RelayError::ReadFailed(format!("dequeue: {}", e)))?;

        match &capture.fourcc.repr {
            b"MJPG" | b"JPEG" => format_converters::mjpg_to_frame(buf),
            b"YUYV" => format_converters::yuyv_to_frame(buf, capture.width, capture.height),
            b"RGB3" => format_converters::rgb24_to_frame(buf, capture.width, capture.height),
            other => Err(RelayError::ReadFailed(format!(
                "unsupported capture format {}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    fn release(&mut self) {
        if let Some(capture) = self.capture.take() {
            info!(index = self.device_index, "Releasing capture device");
            drop(capture);
            // Let the OS fully reclaim the device before any reopen attempt;
            // fast release/reopen cycles otherwise report a busy device.
            thread::sleep(crate::constants::timing::RELEASE_SETTLE);
        }
    }
}

impl Drop for V4l2FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unopened_source_read_fails() {
        let mut source = V4l2FrameSource::new(0, 640, 480, Framerate::from_int(30));
        assert!(!source.is_open());
        assert!(source.read().is_err());
    }

    #[test]
    fn test_release_when_closed_is_noop() {
        let mut source = V4l2FrameSource::new(0, 640, 480, Framerate::from_int(30));
        // Must not sleep or panic when nothing is held
        let start = std::time::Instant::now();
        source.release();
        source.release();
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
