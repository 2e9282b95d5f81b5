//! Handpilot error types
//!
//! Centralized error handling. Per-worker errors never cross into the
//! fusion loop except as the absence of a mailbox update; only device-open
//! failures at startup are allowed to abort the pipeline.

use thiserror::Error;

/// Central error type for Handpilot
#[derive(Error, Debug)]
pub enum HandError {
    /// Fatal to the owning worker; other workers are unaffected.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Recognition/classifier call failure. Logged and treated as
    /// "no result this round"; the loop continues.
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Gesture file fails the fixed-length/parse contract. The switch
    /// request is rejected, the active gesture stays unchanged.
    #[error("Malformed gesture profile '{name}': {reason}")]
    MalformedProfile { name: String, reason: String },

    #[error("Unknown gesture '{0}'")]
    UnknownGesture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Actuator error: {0}")]
    Actuator(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Handpilot operations
pub type HandResult<T> = Result<T, HandError>;
