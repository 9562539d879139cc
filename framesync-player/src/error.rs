//! Error types for framesync-player
//!
//! End of stream and a temporarily exhausted storage pool are normal
//! conditions (`Ok(None)` / `None`), not variants of this enum.

use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decoder reported corrupt or unreadable data
    #[error("Decoder fault: {0}")]
    DecoderFault(String),

    /// Audio output device could not be opened
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio output device stopped accepting data
    #[error("Audio device write fault: {0}")]
    DeviceWriteFault(String),

    /// Decoded payload does not fit in a storage unit
    #[error("Payload of {needed} bytes exceeds storage unit capacity {capacity}")]
    UnitOverflow { needed: usize, capacity: usize },

    /// A storage unit was returned to a slot that is already free
    #[error("Storage unit {slot} released twice")]
    DoubleRelease { slot: usize },

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Errors from the common crate (config parsing, input validation)
    #[error(transparent)]
    Common(#[from] framesync_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using framesync-player Error
pub type Result<T> = std::result::Result<T, Error>;
