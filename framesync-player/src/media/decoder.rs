//! Decoder interface consumed by the read-ahead cache
//!
//! The engine never parses a container itself. A decoder is a pull-style
//! source that writes one decoded frame into a caller-supplied storage unit
//! per call.

use crate::audio::AudioFormat;
use crate::error::Result;
use crate::media::frame::{FrameInfo, StorageUnit};

/// Pull-style frame source
///
/// `next_frame` returns `Ok(None)` at end of stream. Errors are treated as
/// corrupt data and end the session; there is no retry.
pub trait FrameDecoder: Send {
    /// Rewind to the first frame
    fn reset(&mut self) -> Result<()>;

    /// Reposition so the next frame returned is the first at or after `target_tick`
    fn seek(&mut self, target_tick: i64) -> Result<()>;

    /// Decode the next frame into `unit`
    fn next_frame(&mut self, unit: &mut StorageUnit) -> Result<Option<FrameInfo>>;

    /// Total stream length in ticks
    fn duration_ticks(&self) -> i64;

    /// Format of audio frames, or None for a silent stream
    fn audio_format(&self) -> Option<AudioFormat>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn seek(&mut self, target_tick: i64) -> Result<()> {
        (**self).seek(target_tick)
    }

    fn next_frame(&mut self, unit: &mut StorageUnit) -> Result<Option<FrameInfo>> {
        (**self).next_frame(unit)
    }

    fn duration_ticks(&self) -> i64 {
        (**self).duration_ticks()
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        (**self).audio_format()
    }
}
