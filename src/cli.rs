// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the relay utility
//!
//! This module provides command-line functionality for:
//! - Running the relay in the foreground
//! - Listing capture and virtual camera devices

use std::path::PathBuf;
use std::sync::mpsc;

use tracing::info;
use v4l::video::Capture;

use vcm::backends::virtual_camera::find_loopback_devices;
use vcm::{ActivationState, Config, RelayManager};

/// Run the relay in the foreground until Ctrl-C
pub fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let state = ActivationState::new(config.enable_camera_function);
    let mut relay = RelayManager::new(config.relay_config(), state);
    relay.start();

    let (exit_tx, exit_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = exit_tx.send(());
    })?;

    println!(
        "VCM running ({}x{}@{}fps, camera {}, feed initially {}). Press Ctrl-C to exit.",
        config.camera_width,
        config.camera_height,
        config.camera_fps,
        config.selected_camera_id,
        if relay.state().feature_enabled() {
            "on"
        } else {
            "muted"
        }
    );
    exit_rx.recv()?;

    // Shutdown order matters: the relay releases its devices before the
    // process exits so the loopback node is left clean for the next run
    info!("Exit requested, shutting down");
    relay.stop();
    Ok(())
}

/// List capture devices and loopback candidates
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let mut nodes = v4l::context::enum_devices();
    nodes.sort_by_key(|node| node.index());

    println!("Capture devices:");
    let mut found_capture = false;
    for node in &nodes {
        let Ok(device) = v4l::Device::with_path(node.path()) else {
            continue;
        };
        let Ok(caps) = device.query_caps() else {
            continue;
        };
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            continue;
        }
        found_capture = true;

        let name = node.name().unwrap_or_else(|| "unknown".to_string());
        println!("  [{}] {} ({})", node.index(), name, node.path().display());

        // Show the formats the relay would negotiate against
        if let Ok(formats) = device.enum_formats() {
            let fourccs: Vec<String> = formats.iter().map(|f| f.fourcc.to_string()).collect();
            if !fourccs.is_empty() {
                println!("      Formats: {}", fourccs.join(", "));
            }
        }
    }
    if !found_capture {
        println!("  none found");
    }

    println!();
    println!("Virtual camera devices (v4l2loopback):");
    let loopbacks = find_loopback_devices();
    if loopbacks.is_empty() {
        println!("  none found (is the v4l2loopback module loaded?)");
    } else {
        for path in loopbacks {
            println!("  {}", path.display());
        }
    }

    Ok(())
}
