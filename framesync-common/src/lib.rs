//! # framesync Common Library
//!
//! Shared code for the framesync playback engine:
//! - Tick-based timing conversions
//! - Engine configuration (TOML bootstrap)
//! - Engine event types (EngineEvent enum)
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod timing;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use events::{EngineEvent, PlaybackState};
