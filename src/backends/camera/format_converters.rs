// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for captured frames
//!
//! The capture device negotiation is best-effort, so the bytes coming out of
//! the mmap stream may be MJPG, YUYV or packed RGB depending on what the
//! driver actually accepted. Everything is converted to tightly packed RGB24
//! before entering the relay pipeline.

use crate::errors::{RelayError, RelayResult};

use super::types::Frame;

/// Decode one MJPG (motion JPEG) buffer to RGB24
///
/// Each MJPG frame is a standalone JPEG image. Decoded dimensions are taken
/// from the JPEG header itself; they override whatever the driver reported.
pub fn mjpg_to_frame(data: &[u8]) -> RelayResult<Frame> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| RelayError::ReadFailed(format!("MJPG decode: {}", e)))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_rgb(width, height, rgb.into_raw())
        .ok_or_else(|| RelayError::ReadFailed("MJPG decode produced short buffer".into()))
}

/// Convert YUYV (YUV 4:2:2 packed) to RGB24
///
/// YUYV format: Y0 U Y1 V - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_frame(data: &[u8], width: u32, height: u32) -> RelayResult<Frame> {
    let pixel_count = (width * height) as usize;
    if data.len() < pixel_count * 2 {
        return Err(RelayError::ReadFailed(format!(
            "YUYV buffer too short: got {}, need {}",
            data.len(),
            pixel_count * 2
        )));
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);

    // YUYV: Y0 U Y1 V - processes 2 pixels at a time
    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        // Convert YUV to RGB (BT.601)
        for y in [y0, y1] {
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

            rgb.push(r);
            rgb.push(g);
            rgb.push(b);

            if rgb.len() >= pixel_count * 3 {
                break;
            }
        }
        if rgb.len() >= pixel_count * 3 {
            break;
        }
    }

    Frame::from_rgb(width, height, rgb)
        .ok_or_else(|| RelayError::ReadFailed("YUYV conversion produced short buffer".into()))
}

/// Wrap an already packed RGB24 buffer without conversion
pub fn rgb24_to_frame(data: &[u8], width: u32, height: u32) -> RelayResult<Frame> {
    let expected = Frame::expected_len(width, height);
    if data.len() < expected {
        return Err(RelayError::ReadFailed(format!(
            "RGB24 buffer too short: got {}, need {}",
            data.len(),
            expected
        )));
    }
    // Drivers may append padding past the packed payload; take exactly one frame
    Frame::from_rgb(width, height, data[..expected].to_vec())
        .ok_or_else(|| RelayError::ReadFailed("RGB24 wrap produced short buffer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grayscale_roundtrip() {
        // Y=128, U=V=128 (no chroma) should give mid-gray pixels
        let data = vec![128u8, 128, 128, 128];
        let frame = yuyv_to_frame(&data, 2, 1).unwrap();
        assert_eq!(frame.data.len(), 6);
        for &b in frame.data.iter() {
            assert_eq!(b, 128);
        }
    }

    #[test]
    fn test_yuyv_short_buffer_rejected() {
        let data = vec![0u8; 6];
        assert!(yuyv_to_frame(&data, 4, 4).is_err());
    }

    #[test]
    fn test_rgb24_passthrough() {
        let data = vec![1u8, 2, 3, 4, 5, 6];
        let frame = rgb24_to_frame(&data, 2, 1).unwrap();
        assert_eq!(&frame.data[..], &data[..]);
    }

    #[test]
    fn test_rgb24_trims_trailing_padding() {
        let mut data = vec![7u8; 6];
        data.extend_from_slice(&[0xAA; 10]);
        let frame = rgb24_to_frame(&data, 2, 1).unwrap();
        assert_eq!(frame.data.len(), 6);
        assert!(frame.data.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_mjpg_rejects_garbage() {
        let data = vec![0u8; 64];
        assert!(mjpg_to_frame(&data).is_err());
    }
}
