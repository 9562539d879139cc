//! Frame model, storage pool, decoder interface and presentation sinks

pub mod decoder;
pub mod frame;
pub mod pool;
pub mod scripted;
pub mod sinks;

pub use decoder::FrameDecoder;
pub use frame::{Frame, FrameInfo, FrameKind, Payload, PictureRef, StorageUnit};
pub use pool::{FramePool, PoolStats};
pub use scripted::{ScriptedDecoder, SyntheticStream};
pub use sinks::{
    DisplaySink, LogDisplay, LogSubtitles, PresentedPicture, RecordingDisplay,
    RecordingSubtitles, SubtitleSink,
};
