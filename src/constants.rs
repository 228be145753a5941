// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Granularity at which blocking waits re-check the stop signal.
    /// Bounds shutdown latency at every suspension point.
    pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Settle pause after releasing the capture device so the OS can
    /// reclaim it before a reopen; fast cycles otherwise hit "device busy"
    pub const RELEASE_SETTLE: Duration = Duration::from_secs(1);

    /// Pause after a frame-send fault before the next cycle
    pub const SEND_FAULT_PAUSE: Duration = Duration::from_millis(500);

    /// How long `stop()` waits for the relay worker to terminate
    pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

    /// Per-call timeout handed to the sink's consumer wait while
    /// disconnected; kept short so the stop signal stays responsive
    pub const CONNECTION_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Cadence used when the configured framerate is unspecified (zero)
    pub const FALLBACK_FPS: u32 = 30;
}

/// Capture device constants
pub mod capture {
    /// Requested buffer queue depth (keep small for low latency)
    pub const BUFFER_COUNT: u32 = 1;

    /// Preferred capture fourcc; MJPG is the widely supported compressed
    /// format that lets USB2 webcams deliver high resolutions at full rate
    pub const PREFERRED_FOURCC: &[u8; 4] = b"MJPG";
}

/// Virtual camera constants
pub mod virtual_camera {
    use std::time::Duration;

    /// How long a consumer-connection probe result stays valid before the
    /// `/proc` scan runs again
    pub const CONNECTION_CACHE_TTL: Duration = Duration::from_millis(200);

    /// Sleep step inside the sink's bounded connection wait
    pub const CONNECTION_POLL_STEP: Duration = Duration::from_millis(25);
}
