// SPDX-License-Identifier: MPL-2.0

//! Error types for the relay pipeline

use std::fmt;

/// Result type alias using RelayError
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors raised by the relay pipeline and its device backends
///
/// All variants except `FatalInit` are recoverable: the relay loop logs
/// them and substitutes a placeholder frame for the affected cycle.
#[derive(Debug, Clone)]
pub enum RelayError {
    /// The physical capture device could not be opened
    DeviceUnavailable(String),
    /// A frame could not be read from the open capture device
    ReadFailed(String),
    /// A frame could not be delivered to the virtual output device
    SendFault(String),
    /// The virtual output device could not be created at all
    FatalInit(String),
    /// Configuration errors (a missing file is not an error, malformed content is)
    Config(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::DeviceUnavailable(msg) => write!(f, "Capture device unavailable: {}", msg),
            RelayError::ReadFailed(msg) => write!(f, "Frame read failed: {}", msg),
            RelayError::SendFault(msg) => write!(f, "Frame send fault: {}", msg),
            RelayError::FatalInit(msg) => write!(f, "Virtual camera init failed: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}
