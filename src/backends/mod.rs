// SPDX-License-Identifier: GPL-3.0-only

//! Device backend abstractions
//!
//! - [`camera`]: physical V4L2 capture source
//! - [`virtual_camera`]: v4l2loopback output sink

pub mod camera;
pub mod virtual_camera;
