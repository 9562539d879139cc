//! Playback scheduler
//!
//! Pops frames from the read-ahead cache, waits out each frame's wall-clock
//! deadline and dispatches it to the sink for its kind:
//!
//! - Audio: copied onto the audio sink's queue immediately, no wait
//! - Video: presented on the display once the deadline is reached
//! - Subtitle: appended to the subtitle sink once the deadline is reached
//!
//! A video or subtitle frame that shares the previous video or subtitle
//! frame's timestamp is simultaneous and is dispatched without any wait.
//! Audio frames never set that previous timestamp. A video frame reached more than
//! `underrun_tolerance` after its deadline is an underrun: it is presented
//! immediately and counted, and nothing is dropped.
//!
//! Deadlines are waited out with a sleep-then-spin hybrid: short sleeps while
//! more than `spin_lead` remains, then a busy spin until the deadline.

use crate::audio::sink::AudioSink;
use crate::error::Result;
use crate::media::frame::{Frame, FrameKind, Payload};
use crate::media::sinks::{DisplaySink, SubtitleSink};
use crate::playback::cache::ReadAheadCache;
use crate::playback::clock::{FrameTiming, PlaybackClock};
use chrono::Utc;
use framesync_common::config::SchedulerConfig;
use framesync_common::events::EngineEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

impl SchedulerState {
    fn to_u8(self) -> u8 {
        match self {
            SchedulerState::Idle => 0,
            SchedulerState::Running => 1,
            SchedulerState::Stopping => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SchedulerState::Running,
            2 => SchedulerState::Stopping,
            _ => SchedulerState::Idle,
        }
    }
}

/// Dispatch counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub subtitle_frames: u64,
    pub underruns: u64,
    /// Worst lateness of a video frame past its deadline
    pub max_late_ms: u64,
}

impl SchedulerStats {
    pub fn total_frames(&self) -> u64 {
        self.video_frames + self.audio_frames + self.subtitle_frames
    }
}

/// Everything one scheduler session needs
pub struct SchedulerContext {
    pub cache: Arc<ReadAheadCache>,
    pub display: Arc<dyn DisplaySink>,
    pub subtitles: Arc<dyn SubtitleSink>,
    pub audio: Option<Arc<AudioSink>>,
    pub config: SchedulerConfig,
    pub token: CancellationToken,
    pub events: broadcast::Sender<EngineEvent>,
    pub session_id: Uuid,
    /// Timestamp of the last presented video frame
    pub position: Arc<AtomicI64>,
}

struct SchedulerShared {
    state: AtomicU8,
    stats: Mutex<SchedulerStats>,
}

impl SchedulerShared {
    fn set_state(&self, state: SchedulerState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    fn stats(&self) -> MutexGuard<'_, SchedulerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How the main loop ended
enum LoopExit {
    EndOfStream,
    Cancelled,
}

/// Handle to a running scheduler worker
pub struct PlaybackScheduler {
    shared: Arc<SchedulerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackScheduler {
    /// Spawn the scheduler thread in `Running` state
    pub fn start(context: SchedulerContext) -> Result<Self> {
        let shared = Arc::new(SchedulerShared {
            state: AtomicU8::new(SchedulerState::Running.to_u8()),
            stats: Mutex::new(SchedulerStats::default()),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("framesync-scheduler".to_string())
            .spawn(move || Self::run(context, &worker_shared))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn run(context: SchedulerContext, shared: &SchedulerShared) {
        debug!("Scheduler started (session {})", context.session_id);

        let exit = Self::main_loop(&context, shared);
        shared.set_state(SchedulerState::Stopping);

        let stats = *shared.stats();
        match exit {
            LoopExit::EndOfStream => {
                if let Some(audio) = &context.audio {
                    audio.finish_and_stop_audio();
                }
                match context.cache.fault() {
                    Some(message) => {
                        warn!("Playback ended early after decoder fault: {}", message);
                    }
                    None => {
                        info!(
                            "Playback finished: {} frames ({} underruns)",
                            stats.total_frames(),
                            stats.underruns
                        );
                        let _ = context.events.send(EngineEvent::PlaybackFinished {
                            session_id: context.session_id,
                            frames_dispatched: stats.total_frames(),
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
            LoopExit::Cancelled => {
                debug!("Scheduler cancelled after {} frames", stats.total_frames());
            }
        }

        shared.set_state(SchedulerState::Idle);
    }

    fn main_loop(context: &SchedulerContext, shared: &SchedulerShared) -> LoopExit {
        let mut clock = PlaybackClock::new();
        let tolerance = context.config.underrun_tolerance();

        loop {
            if context.token.is_cancelled() {
                return LoopExit::Cancelled;
            }

            let Some(frame) = context.cache.get_frame() else {
                if context.token.is_cancelled() {
                    return LoopExit::Cancelled;
                }
                return LoopExit::EndOfStream;
            };

            if frame.kind() == FrameKind::Audio {
                clock.observe(frame.timestamp(), Instant::now());
            } else {
                let timing = clock.schedule(frame.timestamp(), Instant::now());
                if let FrameTiming::At(deadline) = timing {
                    let now = Instant::now();
                    if now > deadline {
                        if frame.kind() == FrameKind::Video {
                            Self::check_lateness(context, shared, &frame, now - deadline, tolerance);
                        }
                    } else if !wait_until(deadline, &context.token, &context.config) {
                        Self::release(context, frame);
                        return LoopExit::Cancelled;
                    }
                }
            }

            Self::dispatch(context, shared, &frame);
            Self::release(context, frame);

            std::thread::yield_now();
        }
    }

    fn check_lateness(
        context: &SchedulerContext,
        shared: &SchedulerShared,
        frame: &Frame,
        late: Duration,
        tolerance: Duration,
    ) {
        let late_ms = late.as_millis() as u64;
        let mut stats = shared.stats();
        stats.max_late_ms = stats.max_late_ms.max(late_ms);
        if late <= tolerance {
            return;
        }
        stats.underruns += 1;
        drop(stats);

        warn!(
            "Underrun: video frame @ {} reached {} ms after its deadline",
            frame.timestamp(),
            late_ms
        );
        let _ = context.events.send(EngineEvent::Underrun {
            session_id: context.session_id,
            frame_ticks: frame.timestamp(),
            late_ms,
            timestamp: Utc::now(),
        });
    }

    fn dispatch(context: &SchedulerContext, shared: &SchedulerShared, frame: &Frame) {
        match frame.payload() {
            Payload::Pcm(data) => {
                if let Some(audio) = &context.audio {
                    audio.push(data.to_vec());
                }
                shared.stats().audio_frames += 1;
            }
            Payload::Picture(picture) => {
                context.display.present(picture);
                context.position.store(frame.timestamp(), Ordering::SeqCst);
                shared.stats().video_frames += 1;
            }
            Payload::Text(text) => {
                context.subtitles.append(&text);
                shared.stats().subtitle_frames += 1;
            }
        }
        trace!("Dispatched {} frame @ {}", frame.kind(), frame.timestamp());
    }

    fn release(context: &SchedulerContext, frame: Frame) {
        if let Err(e) = context.cache.release_frame(frame) {
            error!("Failed to release frame: {}", e);
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.shared.stats()
    }

    /// True while the worker thread is running
    pub fn is_alive(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the worker to exit. Cancel the session token first unless
    /// the stream is known to be ending.
    pub fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Scheduler worker panicked");
            }
        }
    }
}

/// Wait until `deadline`, sleeping while far away and spinning close to it.
/// Returns false if `token` was cancelled first.
pub fn wait_until(deadline: Instant, token: &CancellationToken, config: &SchedulerConfig) -> bool {
    let spin_lead = config.spin_lead();
    let max_slice = config.max_sleep_slice();

    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        if remaining > spin_lead {
            std::thread::sleep((remaining - spin_lead).min(max_slice));
        } else {
            std::hint::spin_loop();
        }
    }
}
