//! Error taxonomy.
//!
//! None of these cross the render-call boundary: the hardware session and
//! the controller classify, log and swallow them. They exist so the inner
//! layers can use `Result` and `?` like any other Rust code.

use thiserror::Error;

/// Failures reported by the opaque matrix hardware layer.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The hardware service could not be reached or initialised.
    #[error("matrix hardware unavailable: {0}")]
    Unavailable(String),

    /// The hardware accepted the call but refused it (bad device code,
    /// frame size mismatch, released session...).
    #[error("matrix hardware rejected the request: {0}")]
    Rejected(String),

    /// A frame was pushed before the session finished connecting.
    #[error("matrix hardware is not connected")]
    NotConnected,
}

/// A SHOW_PIXEL_DATA payload that cannot be turned into a grid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("pixel payload is empty")]
    Empty,

    #[error("pixel payload is malformed: {0}")]
    Malformed(String),
}

/// Problems reading or writing the persisted settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
