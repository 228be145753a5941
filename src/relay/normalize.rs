// SPDX-License-Identifier: GPL-3.0-only

//! Frame normalization before delivery to the virtual camera
//!
//! The sink requires exact target geometry, and output is always mirrored
//! horizontally so consumers see the conventional selfie view. Both steps
//! are pure functions over the pixel buffer.

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::backends::camera::types::Frame;

/// Resize a captured frame to the target geometry (bilinear) when it does
/// not already match, then mirror it horizontally.
pub fn normalize(frame: &Frame, target_width: u32, target_height: u32) -> Frame {
    let image = to_image(frame);

    let sized = if frame.matches_size(target_width, target_height) {
        image
    } else {
        imageops::resize(&image, target_width, target_height, FilterType::Triangle)
    };

    let mirrored = imageops::flip_horizontal(&sized);

    Frame {
        width: target_width,
        height: target_height,
        data: mirrored.into_raw().into(),
    }
}

fn to_image(frame: &Frame) -> RgbImage {
    // Frame construction guarantees the buffer length matches the geometry
    RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
        .unwrap_or_else(|| RgbImage::new(frame.width, frame.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x1 frame with a red pixel on the left, blue on the right
    fn asymmetric_frame() -> Frame {
        Frame::from_rgb(2, 1, vec![255, 0, 0, 0, 0, 255]).unwrap()
    }

    #[test]
    fn test_mirror_without_resize() {
        let normalized = normalize(&asymmetric_frame(), 2, 1);
        // Blue now left, red now right
        assert_eq!(&normalized.data[..], &[0, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn test_resize_to_target_geometry() {
        let frame = Frame::blank(64, 48);
        let normalized = normalize(&frame, 32, 24);
        assert!(normalized.matches_size(32, 24));
        assert_eq!(normalized.data.len(), Frame::expected_len(32, 24));
    }

    #[test]
    fn test_resize_then_mirror_keeps_orientation() {
        // 4x1: three red pixels then one blue; after 2x1 downscale the blue
        // half must land left once mirrored
        let frame = Frame::from_rgb(
            4,
            1,
            vec![255, 0, 0, 255, 0, 0, 255, 0, 0, 0, 0, 255],
        )
        .unwrap();
        let normalized = normalize(&frame, 2, 1);
        assert!(normalized.matches_size(2, 1));

        let left = &normalized.data[0..3];
        let right = &normalized.data[3..6];
        // Left pixel carries the blue contribution, right stays pure red
        assert!(left[2] > 0);
        assert_eq!(right, &[255, 0, 0]);
    }

    #[test]
    fn test_double_mirror_is_identity() {
        let frame = asymmetric_frame();
        let once = normalize(&frame, 2, 1);
        let twice = normalize(&once, 2, 1);
        assert_eq!(&twice.data[..], &frame.data[..]);
    }
}
