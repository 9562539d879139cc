//! # framesync player library
//!
//! Real-time playback of a timestamped frame sequence.
//!
//! **Purpose:** Decode ahead of playback on a worker thread, present each
//! video/subtitle frame at its wall-clock deadline, and stream audio to an
//! output device at the device's own pace.
//!
//! **Architecture:** Three workers per playback session, started and torn
//! down together by the [`PlaybackController`]:
//! - read-ahead cache: decoder -> bounded frame queue over a fixed storage pool
//! - scheduler: frame queue -> display / subtitle sinks and the audio queue
//! - audio sink: audio queue -> resampler -> output device

pub mod audio;
pub mod error;
pub mod media;
pub mod playback;

pub use error::{Error, Result};
pub use playback::PlaybackController;
