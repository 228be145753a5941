// SPDX-License-Identifier: MPL-2.0

//! VCM - Virtual camera mute for video conferencing
//!
//! This library provides the core functionality for the VCM background
//! utility: a relay pipeline that feeds a v4l2loopback virtual camera from a
//! physical capture device and swaps in a blank placeholder whenever the
//! user mutes the feed or no consumer is attached.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: capture source and virtual camera sink abstraction
//! - [`relay`]: the relay worker, its state machine and frame normalization
//! - [`state`]: shared activation flags polled by the loop and observers
//! - [`config`]: user configuration handling
//!
//! External collaborators (hotkey handler, tray menu, on-screen display)
//! interact with the core only through [`state::ActivationState`] and the
//! [`relay::RelayManager`] start/stop surface.

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod relay;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use errors::{RelayError, RelayResult};
pub use relay::{RelayConfig, RelayManager};
pub use state::{ActivationState, ActivationView};
