// SPDX-License-Identifier: GPL-3.0-only

//! User configuration handling
//!
//! Persisted as JSON under the user config directory. A missing file is not
//! an error: defaults are written back on first load, matching the behavior
//! users expect from a background utility. Hotkey strings are carried for
//! the external hotkey handler; the relay core never interprets them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backends::camera::types::Framerate;
use crate::errors::{RelayError, RelayResult};
use crate::relay::RelayConfig;

/// Application configuration
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global hotkey toggling the camera feed
    pub camera_toggle_hotkey: String,
    /// Global hotkey toggling the microphone
    pub mic_toggle_hotkey: String,
    /// Index of the physical capture device (/dev/videoN)
    pub selected_camera_id: u32,
    /// Capture/output width in pixels
    pub camera_width: u32,
    /// Capture/output height in pixels
    pub camera_height: u32,
    /// Target framerate; 0 means unspecified (30fps fallback cadence)
    pub camera_fps: u32,
    /// Whether the camera feed starts enabled
    pub enable_camera_function: bool,
    /// Whether the microphone toggle starts enabled
    pub enable_mic_function: bool,
    /// Explicit v4l2loopback node; `None` auto-discovers one
    pub loopback_device: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_toggle_hotkey: "super+shift+a".to_string(),
            mic_toggle_hotkey: "super+shift+o".to_string(),
            selected_camera_id: 0,
            camera_width: 1280,
            camera_height: 720,
            camera_fps: 30,
            enable_camera_function: true, // Camera feed enabled by default
            enable_mic_function: true,
            loopback_device: None, // Auto-discover by default
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/vcm/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vcm").join("config.json"))
    }

    /// Load the configuration from the default location.
    ///
    /// A missing file yields defaults which are written back best-effort; a
    /// malformed file is an error so typos never silently reset settings.
    pub fn load() -> RelayResult<Self> {
        let Some(path) = Self::default_path() else {
            warn!("No user config directory available, using defaults");
            return Ok(Self::default());
        };
        Self::load_from(&path)
    }

    /// Load from an explicit path (missing file → defaults written back)
    pub fn load_from(path: &Path) -> RelayResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, writing defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(path) {
                warn!(error = %e, "Could not write default config");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| RelayError::Config(format!("parse {}: {}", path.display(), e)))
    }

    /// Save to the default location
    pub fn save(&self) -> RelayResult<()> {
        let path = Self::default_path()
            .ok_or_else(|| RelayError::Config("no user config directory available".into()))?;
        self.save_to(&path)
    }

    /// Save to an explicit path, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> RelayResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RelayError::Config(format!("create {}: {}", parent.display(), e)))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| RelayError::Config(format!("write {}: {}", path.display(), e)))
    }

    /// Relay configuration derived from the user settings
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            device_index: self.selected_camera_id,
            width: self.camera_width,
            height: self.camera_height,
            framerate: Framerate::from_int(self.camera_fps),
            loopback_path: self.loopback_device.clone(),
        }
    }
}
