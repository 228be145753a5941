// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the capture backend

//! Shared frame and format types

use std::sync::Arc;

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Get the rounded integer framerate
    pub fn as_int(&self) -> u32 {
        self.num / self.denom
    }

    /// A zero numerator means the rate was left unspecified by the user
    pub fn is_unspecified(&self) -> bool {
        self.num == 0
    }

    /// Duration of one frame at this rate.
    ///
    /// An unspecified rate falls back to the default 30fps cadence so the
    /// relay loop always has a finite frame interval to pace against.
    pub fn frame_interval(&self) -> std::time::Duration {
        let fps = if self.is_unspecified() {
            crate::constants::timing::FALLBACK_FPS as f64
        } else {
            self.as_f64()
        };
        std::time::Duration::from_secs_f64(1.0 / fps)
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fps = self.as_f64();
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", fps)
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// A single video frame, tightly packed RGB24 (3 bytes per pixel, no padding)
///
/// The payload lives behind an `Arc` so the precomputed placeholder frame can
/// be cloned into every idle cycle without reallocating the pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl Frame {
    /// Expected byte length of a packed RGB24 frame of the given geometry
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Build a frame from packed RGB24 bytes.
    ///
    /// Returns `None` when the buffer length does not match the geometry,
    /// which always indicates a converter bug upstream.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != Self::expected_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            data: Arc::from(data),
        })
    }

    /// Solid black frame of the given geometry
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: Arc::from(vec![0u8; Self::expected_len(width, height)]),
        }
    }

    /// Check whether this frame matches the given geometry
    pub fn matches_size(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framerate_interval() {
        let fr = Framerate::from_int(30);
        let interval = fr.frame_interval();
        assert!((interval.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_framerate_unspecified_falls_back() {
        let fr = Framerate::new(0, 1);
        assert!(fr.is_unspecified());
        // Unspecified rate paces at the fallback cadence, not infinity
        let interval = fr.frame_interval();
        assert!(interval.as_millis() > 0);
        assert!(interval.as_millis() < 100);
    }

    #[test]
    fn test_framerate_ntsc() {
        let fr = Framerate::new(60000, 1001);
        assert_eq!(fr.as_int(), 59);
        assert!((fr.as_f64() - 59.94).abs() < 0.01);
    }

    #[test]
    fn test_frame_from_rgb_rejects_bad_length() {
        assert!(Frame::from_rgb(4, 4, vec![0u8; 47]).is_none());
        assert!(Frame::from_rgb(4, 4, vec![0u8; 48]).is_some());
    }

    #[test]
    fn test_blank_frame_is_black() {
        let frame = Frame::blank(8, 4);
        assert_eq!(frame.data.len(), 8 * 4 * 3);
        assert!(frame.data.iter().all(|&b| b == 0));
    }
}
