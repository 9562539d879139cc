//! Audio sink, output devices and resampling

pub mod device;
#[cfg(feature = "cpal-output")]
pub mod output;
pub mod queue;
pub mod resampler;
pub mod sink;
pub mod types;

pub use device::{AudioBackend, AudioDevice, CaptureBackend, CapturedWrite, DrainMode};
pub use framesync_common::config::ResamplePolicy;
#[cfg(feature = "cpal-output")]
pub use output::CpalBackend;
pub use queue::AudioQueue;
pub use resampler::Resampler;
pub use sink::{AudioSink, SinkStats};
pub use types::{AudioFormat, DeviceSpec};
