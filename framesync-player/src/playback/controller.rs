//! Playback controller
//!
//! Owns the decoder between sessions and starts/stops the three workers of
//! a session (read-ahead cache, scheduler, audio sink). All commands take
//! `&self` and may be called from any thread; they are serialized by one
//! mutex around the controller state. Workers never take that mutex.
//!
//! # Teardown order
//!
//! 1. Cancel the session token (reaches scheduler and cache)
//! 2. Stop the audio sink, unless audio is kept
//! 3. Join the scheduler, then the cache (which hands the decoder back)
//! 4. Release every frame still queued, so the pool is whole again

use crate::audio::device::AudioBackend;
use crate::audio::sink::AudioSink;
use crate::error::{Error, Result};
use crate::media::decoder::FrameDecoder;
use crate::media::pool::PoolStats;
use crate::media::sinks::{DisplaySink, SubtitleSink};
use crate::playback::cache::ReadAheadCache;
use crate::playback::scheduler::{PlaybackScheduler, SchedulerContext, SchedulerState, SchedulerStats};
use chrono::Utc;
use framesync_common::events::{EngineEvent, PlaybackState};
use framesync_common::EngineConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Buffered events per subscriber before old ones are dropped
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Which workers of the current session are still running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerLiveness {
    pub cache: bool,
    pub scheduler: bool,
    pub audio: bool,
}

impl WorkerLiveness {
    pub fn any(&self) -> bool {
        self.cache || self.scheduler || self.audio
    }
}

struct Session {
    id: Uuid,
    token: CancellationToken,
    cache: Arc<ReadAheadCache>,
    scheduler: PlaybackScheduler,
    audio: Option<Arc<AudioSink>>,
    start_position: i64,
}

struct ControllerInner {
    decoder: Option<Box<dyn FrameDecoder>>,
    session: Option<Session>,
    /// Audio sink kept open by `stop_keeping_audio` for the next session
    retained_audio: Option<Arc<AudioSink>>,
    /// Where the next `play` should seek the decoder to
    resume_from: Option<i64>,
    last_error: Option<String>,
    last_stats: SchedulerStats,
    last_pool: PoolStats,
    duration_ticks: i64,
}

/// Play / stop / seek front end of the engine
pub struct PlaybackController {
    inner: Mutex<ControllerInner>,
    config: EngineConfig,
    display: Arc<dyn DisplaySink>,
    subtitles: Arc<dyn SubtitleSink>,
    backend: Arc<dyn AudioBackend>,
    events: broadcast::Sender<EngineEvent>,
    position: Arc<AtomicI64>,
}

impl PlaybackController {
    pub fn new(
        decoder: Box<dyn FrameDecoder>,
        display: Arc<dyn DisplaySink>,
        subtitles: Arc<dyn SubtitleSink>,
        backend: Arc<dyn AudioBackend>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let duration_ticks = decoder.duration_ticks();
        let capacity = config.cache.capacity;

        Self {
            inner: Mutex::new(ControllerInner {
                decoder: Some(decoder),
                session: None,
                retained_audio: None,
                resume_from: None,
                last_error: None,
                last_stats: SchedulerStats::default(),
                last_pool: PoolStats {
                    capacity,
                    free: capacity,
                    bound: 0,
                },
                duration_ticks,
            }),
            config,
            display,
            subtitles,
            backend,
            events,
            position: Arc::new(AtomicI64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Start a playback session. A no-op while already playing.
    pub fn play(&self) -> Result<()> {
        let mut inner = self.lock();
        self.play_locked(&mut inner)
    }

    fn play_locked(&self, inner: &mut ControllerInner) -> Result<()> {
        match inner.session.as_ref().map(|s| s.scheduler.state()) {
            Some(SchedulerState::Running) => {
                debug!("play: already playing");
                return Ok(());
            }
            // Previous session ended on its own; replay from the start
            Some(_) => self.reap_finished(inner),
            None => {}
        }

        let mut decoder = inner
            .decoder
            .take()
            .ok_or_else(|| Error::InvalidState("decoder unavailable".to_string()))?;

        let start_position = match inner.resume_from.take() {
            Some(position) => {
                if let Err(e) = decoder.seek(position) {
                    inner.decoder = Some(decoder);
                    return Err(e);
                }
                position
            }
            None => self.position.load(Ordering::SeqCst),
        };

        let session_id = Uuid::new_v4();

        let audio = match self.prepare_audio(inner, &*decoder, session_id) {
            Ok(audio) => audio,
            Err(e) => {
                inner.resume_from = Some(start_position);
                inner.decoder = Some(decoder);
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        let cache = match ReadAheadCache::start(
            decoder,
            &self.config.cache,
            token.child_token(),
            self.events.clone(),
            session_id,
        ) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                error!("Failed to start read-ahead cache: {}", e);
                inner.last_error = Some(e.to_string());
                inner.retained_audio = audio;
                return Err(e);
            }
        };

        let context = SchedulerContext {
            cache: Arc::clone(&cache),
            display: Arc::clone(&self.display),
            subtitles: Arc::clone(&self.subtitles),
            audio: audio.clone(),
            config: self.config.scheduler.clone(),
            token: token.clone(),
            events: self.events.clone(),
            session_id,
            position: Arc::clone(&self.position),
        };
        let scheduler = match PlaybackScheduler::start(context) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                token.cancel();
                cache.stop_caching();
                inner.decoder = cache.join();
                cache.drain();
                inner.retained_audio = audio;
                return Err(e);
            }
        };

        info!(
            "Playback started (session {}, position {} ticks, audio={})",
            session_id,
            start_position,
            audio.is_some()
        );
        inner.session = Some(Session {
            id: session_id,
            token,
            cache,
            scheduler,
            audio,
            start_position,
        });
        self.emit(EngineEvent::PlaybackStarted {
            session_id,
            position_ticks: start_position,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Reuse the retained sink when it still fits, otherwise open a new one
    fn prepare_audio(
        &self,
        inner: &mut ControllerInner,
        decoder: &dyn FrameDecoder,
        session_id: Uuid,
    ) -> Result<Option<Arc<AudioSink>>> {
        let retained = inner.retained_audio.take();

        let Some(format) = decoder.audio_format() else {
            if let Some(sink) = retained {
                sink.stop_audio();
            }
            return Ok(None);
        };

        if let Some(sink) = retained {
            if sink.is_accepting() && sink.format() == format {
                debug!("Reusing retained audio sink");
                sink.set_session(session_id);
                return Ok(Some(sink));
            }
            sink.stop_audio();
        }

        match AudioSink::open(
            Arc::clone(&self.backend),
            format,
            &self.config.audio,
            self.events.clone(),
            session_id,
        ) {
            Ok(sink) => Ok(Some(Arc::new(sink))),
            Err(e) => {
                let message = e.to_string();
                error!("Playback aborted: {}", message);
                inner.last_error = Some(message.clone());
                self.emit(EngineEvent::AudioDeviceFault {
                    session_id,
                    message,
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    /// Tear down the current session. Returns its id if there was one.
    fn teardown(&self, inner: &mut ControllerInner, keep_audio: bool) -> Option<Uuid> {
        let session = inner.session.take()?;

        session.token.cancel();
        session.cache.stop_caching();
        if !keep_audio {
            if let Some(audio) = &session.audio {
                audio.stop_audio();
            }
        }

        session.scheduler.join();
        let decoder = session.cache.join();
        session.cache.drain();

        inner.last_stats = session.scheduler.stats();
        inner.last_pool = session.cache.pool_stats();
        if !inner.last_pool.is_consistent() || inner.last_pool.free != inner.last_pool.capacity {
            warn!("Storage pool not whole after teardown: {:?}", inner.last_pool);
        }

        if let Some(message) = session.cache.fault() {
            inner.last_error = Some(message);
        }
        if let Some(message) = session.audio.as_ref().and_then(|a| a.fault()) {
            inner.last_error = Some(message);
        }

        match decoder {
            Some(decoder) => inner.decoder = Some(decoder),
            None => inner.last_error = Some("cache worker lost the decoder".to_string()),
        }

        if keep_audio {
            inner.retained_audio = session.audio;
        }

        debug!("Session {} torn down (kept_audio={})", session.id, keep_audio);

        // Resume after the last presented frame, or where the session began
        inner.resume_from = Some(if inner.last_stats.video_frames > 0 {
            self.position.load(Ordering::SeqCst) + 1
        } else {
            session.start_position
        });

        Some(session.id)
    }

    /// A session whose scheduler already went idle: collect it and rewind.
    /// Audio still draining from it is cut off.
    fn reap_finished(&self, inner: &mut ControllerInner) {
        if let Some(id) = self.teardown(inner, false) {
            debug!("Reaped finished session {}", id);
        }
        self.rewind(inner);
    }

    fn rewind(&self, inner: &mut ControllerInner) {
        inner.resume_from = None;
        self.position.store(0, Ordering::SeqCst);
        if let Some(decoder) = inner.decoder.as_mut() {
            if let Err(e) = decoder.reset() {
                error!("Decoder reset failed: {}", e);
                inner.last_error = Some(e.to_string());
            }
        }
    }

    /// Stop playback, close the audio device and rewind. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.lock();
        let stopped = self.teardown(&mut inner, false);
        if let Some(sink) = inner.retained_audio.take() {
            sink.stop_audio();
        }
        self.rewind(&mut inner);

        if let Some(session_id) = stopped {
            info!("Playback stopped (session {})", session_id);
            self.emit(EngineEvent::PlaybackStopped {
                session_id,
                kept_audio: false,
                timestamp: Utc::now(),
            });
        }
    }

    /// Stop the scheduling loop but keep the audio device open for the next
    /// session. The next `play` continues from the current position.
    pub fn stop_keeping_audio(&self) {
        let mut inner = self.lock();
        let finished = inner
            .session
            .as_ref()
            .map(|s| s.scheduler.state() != SchedulerState::Running)
            .unwrap_or(false);
        if finished {
            // Nothing left to resume; same as a finished session being replayed
            self.reap_finished(&mut inner);
            return;
        }
        if let Some(session_id) = self.teardown(&mut inner, true) {
            info!("Playback stopped, audio kept (session {})", session_id);
            self.emit(EngineEvent::PlaybackStopped {
                session_id,
                kept_audio: true,
                timestamp: Utc::now(),
            });
        }
    }

    /// Reposition to `position_ticks` (clamped to the stream). Restarts
    /// playback if it was running, with the audio queue cleared.
    pub fn seek(&self, position_ticks: i64) -> Result<()> {
        let mut inner = self.lock();
        let target = position_ticks.clamp(0, inner.duration_ticks.max(0));
        let was_playing = inner
            .session
            .as_ref()
            .map(|s| s.scheduler.state() == SchedulerState::Running)
            .unwrap_or(false);

        if was_playing {
            self.teardown(&mut inner, true);
        } else if inner.session.is_some() {
            self.reap_finished(&mut inner);
        }

        if let Some(sink) = &inner.retained_audio {
            sink.flush();
        }

        let decoder = inner
            .decoder
            .as_mut()
            .ok_or_else(|| Error::InvalidState("decoder unavailable".to_string()))?;
        decoder.seek(target)?;
        inner.resume_from = None;
        self.position.store(target, Ordering::SeqCst);

        info!("Seeked to {} ticks (was_playing={})", target, was_playing);
        self.emit(EngineEvent::Seeked {
            position_ticks: target,
            timestamp: Utc::now(),
        });

        if was_playing {
            self.play_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Frames decoded ahead and waiting in the frame queue
    pub fn current_buffer_depth(&self) -> usize {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.cache.buffer_depth())
            .unwrap_or(0)
    }

    pub fn is_playing(&self) -> bool {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.scheduler.state() == SchedulerState::Running)
            .unwrap_or(false)
    }

    pub fn playback_state(&self) -> PlaybackState {
        if self.is_playing() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    /// Timestamp of the last presented video frame
    pub fn position_ticks(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    pub fn duration_ticks(&self) -> i64 {
        self.lock().duration_ticks
    }

    pub fn workers_alive(&self) -> WorkerLiveness {
        let inner = self.lock();
        let audio_alive = inner
            .session
            .as_ref()
            .and_then(|s| s.audio.as_ref())
            .or(inner.retained_audio.as_ref())
            .map(|a| a.is_alive())
            .unwrap_or(false);

        match &inner.session {
            Some(session) => WorkerLiveness {
                cache: session.cache.is_alive(),
                scheduler: session.scheduler.is_alive(),
                audio: audio_alive,
            },
            None => WorkerLiveness {
                audio: audio_alive,
                ..Default::default()
            },
        }
    }

    /// Pool occupancy of the current session, or of the last one after teardown
    pub fn pool_stats(&self) -> PoolStats {
        let inner = self.lock();
        inner
            .session
            .as_ref()
            .map(|s| s.cache.pool_stats())
            .unwrap_or(inner.last_pool)
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        let inner = self.lock();
        inner
            .session
            .as_ref()
            .map(|s| s.scheduler.stats())
            .unwrap_or(inner.last_stats)
    }

    /// Most recent decoder or device fault message
    pub fn last_error(&self) -> Option<String> {
        let inner = self.lock();
        if let Some(session) = &inner.session {
            if let Some(message) = session.cache.fault() {
                return Some(message);
            }
            if let Some(message) = session.audio.as_ref().and_then(|a| a.fault()) {
                return Some(message);
            }
        }
        inner.last_error.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Poll until the audio sink has played out and exited. Returns false on timeout.
    pub fn wait_for_audio_drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.workers_alive().audio {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Poll until the session is no longer running. Returns false on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_playing() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}
