//! Playback session workers and the controller that drives them

pub mod cache;
pub mod clock;
pub mod controller;
pub mod scheduler;

pub use cache::{CacheStatus, ReadAheadCache};
pub use clock::{FrameTiming, PlaybackClock};
pub use controller::{PlaybackController, WorkerLiveness};
pub use scheduler::{PlaybackScheduler, SchedulerContext, SchedulerState, SchedulerStats};
