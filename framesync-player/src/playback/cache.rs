//! Read-ahead cache
//!
//! A worker thread pulls frames from the decoder into a FIFO frame queue,
//! one pooled storage unit per frame. The pool and the queue live behind a
//! single mutex with two condition variables:
//!
//! - `frame_ready`: the queue became non-empty or the worker changed state
//! - `unit_freed`: a unit went back to the pool or the queue gained room
//!
//! The queue can never hold more frames than the pool has units, so a
//! decoder that produces faster than playback consumes simply stalls on
//! `unit_freed`. Every wait is bounded by `pool_wait` so cancellation is
//! noticed even without a notification.

use crate::error::{Error, Result};
use crate::media::decoder::FrameDecoder;
use crate::media::frame::Frame;
use crate::media::pool::{FramePool, PoolStats};
use chrono::Utc;
use framesync_common::config::CacheConfig;
use framesync_common::events::EngineEvent;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Worker state as seen by consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// Worker is decoding ahead
    Filling,
    /// Decoder reached end of stream; queued frames remain valid
    Exhausted,
    /// `stop_caching` or session cancellation
    Stopped,
    /// Decoder fault; the session ends once the queue drains
    Faulted(String),
}

struct CacheInner {
    pool: FramePool,
    queue: VecDeque<Frame>,
    status: CacheStatus,
    peak_depth: usize,
}

struct CacheShared {
    inner: Mutex<CacheInner>,
    frame_ready: Condvar,
    unit_freed: Condvar,
    pool_wait: Duration,
}

impl CacheShared {
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, status: CacheStatus) {
        let mut inner = self.lock();
        inner.status = status;
        drop(inner);
        self.frame_ready.notify_all();
        self.unit_freed.notify_all();
    }
}

/// Bounded read-ahead over a decoder
pub struct ReadAheadCache {
    shared: Arc<CacheShared>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<Box<dyn FrameDecoder>>>>,
}

impl ReadAheadCache {
    /// Allocate the pool and start the worker thread.
    ///
    /// `token` is normally a child of the session token so `stop_caching`
    /// can stop the cache alone. The decoder is handed back by `join`.
    pub fn start(
        decoder: Box<dyn FrameDecoder>,
        config: &CacheConfig,
        token: CancellationToken,
        events: broadcast::Sender<EngineEvent>,
        session_id: Uuid,
    ) -> Result<Self> {
        if config.capacity == 0 {
            return Err(Error::Config("cache capacity must be at least 1".to_string()));
        }

        let shared = Arc::new(CacheShared {
            inner: Mutex::new(CacheInner {
                pool: FramePool::new(config.capacity, config.unit_size),
                queue: VecDeque::with_capacity(config.capacity),
                status: CacheStatus::Filling,
                peak_depth: 0,
            }),
            frame_ready: Condvar::new(),
            unit_freed: Condvar::new(),
            pool_wait: config.pool_wait(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_token = token.clone();
        let handle = std::thread::Builder::new()
            .name("framesync-cache".to_string())
            .spawn(move || Self::worker_loop(decoder, &worker_shared, &worker_token, &events, session_id))?;

        info!(
            "Read-ahead cache started: capacity={}, unit_size={}",
            config.capacity, config.unit_size
        );

        Ok(Self {
            shared,
            token,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn worker_loop(
        mut decoder: Box<dyn FrameDecoder>,
        shared: &CacheShared,
        token: &CancellationToken,
        events: &broadcast::Sender<EngineEvent>,
        session_id: Uuid,
    ) -> Box<dyn FrameDecoder> {
        debug!("Cache worker started");
        let mut decoded: u64 = 0;

        loop {
            // Wait for a free unit and queue room
            let mut unit = {
                let mut inner = shared.lock();
                loop {
                    if token.is_cancelled() {
                        drop(inner);
                        debug!("Cache worker cancelled after {} frames", decoded);
                        shared.finish(CacheStatus::Stopped);
                        return decoder;
                    }
                    let capacity = inner.pool.capacity();
                    if inner.queue.len() < capacity {
                        if let Some(unit) = inner.pool.acquire() {
                            break unit;
                        }
                    }
                    trace!("Cache waiting for a free storage unit");
                    inner = shared
                        .unit_freed
                        .wait_timeout(inner, shared.pool_wait)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            };

            // Decode outside the lock. A panicking decoder ends the session
            // like any other fault, with the unit returned.
            let result = panic::catch_unwind(AssertUnwindSafe(|| decoder.next_frame(&mut unit)))
                .unwrap_or_else(|payload| Err(Error::DecoderFault(panic_message(payload.as_ref()))));

            let mut inner = shared.lock();
            match result {
                Ok(Some(info)) => {
                    inner.queue.push_back(Frame::new(unit, info));
                    let depth = inner.queue.len();
                    inner.peak_depth = inner.peak_depth.max(depth);
                    drop(inner);
                    shared.frame_ready.notify_one();
                    decoded += 1;
                    trace!("Queued {} frame @ {} (depth {})", info.kind, info.timestamp, depth);
                }
                Ok(None) => {
                    if let Err(e) = inner.pool.release(unit) {
                        error!("Failed to return unused storage unit: {}", e);
                    }
                    drop(inner);
                    info!("Decoder exhausted after {} frames", decoded);
                    shared.finish(CacheStatus::Exhausted);
                    return decoder;
                }
                Err(e) => {
                    if let Err(release_err) = inner.pool.release(unit) {
                        error!("Failed to return unused storage unit: {}", release_err);
                    }
                    drop(inner);
                    let message = e.to_string();
                    error!("Decoder fault after {} frames: {}", decoded, message);
                    shared.finish(CacheStatus::Faulted(message.clone()));
                    let _ = events.send(EngineEvent::DecoderFault {
                        session_id,
                        message,
                        timestamp: Utc::now(),
                    });
                    return decoder;
                }
            }
        }
    }

    /// Next frame in decode order.
    ///
    /// Blocks until a frame is queued; returns None once the worker has
    /// finished (or the cache was stopped) and the queue is empty.
    pub fn get_frame(&self) -> Option<Frame> {
        let mut inner = self.shared.lock();
        loop {
            if let Some(frame) = inner.queue.pop_front() {
                drop(inner);
                self.shared.unit_freed.notify_one();
                return Some(frame);
            }
            if inner.status != CacheStatus::Filling || self.token.is_cancelled() {
                return None;
            }
            inner = self
                .shared
                .frame_ready
                .wait_timeout(inner, self.shared.pool_wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Return a consumed frame's unit to the pool
    pub fn release_frame(&self, frame: Frame) -> Result<()> {
        let mut inner = self.shared.lock();
        inner.pool.release(frame.into_unit())?;
        drop(inner);
        self.shared.unit_freed.notify_one();
        Ok(())
    }

    /// Stop decoding ahead. Queued frames stay available to `get_frame`.
    pub fn stop_caching(&self) {
        self.token.cancel();
        self.shared.frame_ready.notify_all();
        self.shared.unit_freed.notify_all();
    }

    /// Wait for the worker to exit and take the decoder back.
    /// Returns None if already joined or the worker panicked.
    pub fn join(&self) -> Option<Box<dyn FrameDecoder>> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match handle.join() {
            Ok(decoder) => Some(decoder),
            Err(_) => {
                warn!("Cache worker panicked; decoder lost");
                None
            }
        }
    }

    /// Release every frame still queued. Returns how many were released.
    pub fn drain(&self) -> usize {
        let mut inner = self.shared.lock();
        let mut released = 0;
        while let Some(frame) = inner.queue.pop_front() {
            match inner.pool.release(frame.into_unit()) {
                Ok(()) => released += 1,
                Err(e) => error!("Failed to release drained frame: {}", e),
            }
        }
        drop(inner);
        self.shared.unit_freed.notify_all();
        if released > 0 {
            debug!("Drained {} queued frames back to the pool", released);
        }
        released
    }

    /// Frames currently queued
    pub fn buffer_depth(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn peak_depth(&self) -> usize {
        self.shared.lock().peak_depth
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.shared.lock().pool.stats()
    }

    pub fn status(&self) -> CacheStatus {
        self.shared.lock().status.clone()
    }

    pub fn fault(&self) -> Option<String> {
        match self.status() {
            CacheStatus::Faulted(message) => Some(message),
            _ => None,
        }
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
}

impl Drop for ReadAheadCache {
    fn drop(&mut self) {
        self.stop_caching();
        let _ = self.join();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("decoder panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::FrameInfo;
    use crate::media::scripted::ScriptedDecoder;

    fn video_script(count: i64) -> ScriptedDecoder {
        ScriptedDecoder::new(
            (0..count)
                .map(|i| (FrameInfo::video(i * 100, 1, 1), vec![i as u8]))
                .collect(),
        )
    }

    fn config(capacity: usize) -> CacheConfig {
        CacheConfig {
            capacity,
            unit_size: 16,
            pool_wait_ms: 2,
        }
    }

    fn start(decoder: ScriptedDecoder, capacity: usize) -> ReadAheadCache {
        let (events, _) = broadcast::channel(16);
        ReadAheadCache::start(
            Box::new(decoder),
            &config(capacity),
            CancellationToken::new(),
            events,
            Uuid::new_v4(),
        )
        .unwrap()
    }

    #[test]
    fn test_delivers_in_decode_order() {
        let cache = start(video_script(10), 3);
        let mut timestamps = Vec::new();
        while let Some(frame) = cache.get_frame() {
            timestamps.push(frame.timestamp());
            cache.release_frame(frame).unwrap();
        }
        assert_eq!(timestamps, (0..10).map(|i| i * 100).collect::<Vec<_>>());
        assert_eq!(cache.status(), CacheStatus::Exhausted);

        let stats = cache.pool_stats();
        assert_eq!(stats.free, 3);
        assert!(stats.is_consistent());
    }

    #[test]
    fn test_queue_never_exceeds_capacity() {
        let cache = start(video_script(100), 4);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.buffer_depth(), 4, "worker stalls on a full pool");
        assert_eq!(cache.pool_stats().free, 0);

        let frame = cache.get_frame().unwrap();
        cache.release_frame(frame).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.buffer_depth(), 4);
        assert!(cache.peak_depth() <= 4);
    }

    #[test]
    fn test_stop_caching_keeps_queued_frames() {
        let cache = start(video_script(100), 4);
        std::thread::sleep(Duration::from_millis(30));
        cache.stop_caching();
        assert!(cache.join().is_some());
        assert!(!cache.is_alive());

        let mut served = 0;
        while let Some(frame) = cache.get_frame() {
            served += 1;
            cache.release_frame(frame).unwrap();
        }
        assert_eq!(served, 4);
        assert_eq!(cache.pool_stats().free, 4);
    }

    #[test]
    fn test_decoder_fault_drains_then_ends() {
        let (events, mut rx) = broadcast::channel(16);
        let cache = ReadAheadCache::start(
            Box::new(video_script(10).failing_at(2)),
            &config(8),
            CancellationToken::new(),
            events,
            Uuid::new_v4(),
        )
        .unwrap();

        let mut served = 0;
        while let Some(frame) = cache.get_frame() {
            served += 1;
            cache.release_frame(frame).unwrap();
        }
        assert_eq!(served, 2);
        assert!(cache.fault().is_some());
        assert!(cache.pool_stats().is_consistent());
        assert_eq!(cache.pool_stats().free, 8, "unfilled unit returned");
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::DecoderFault { .. })));
    }

    #[test]
    fn test_oversized_payload_is_a_fault() {
        let decoder = ScriptedDecoder::new(vec![(FrameInfo::video(0, 8, 8), vec![0; 64])]);
        let cache = start(decoder, 2);
        assert!(cache.get_frame().is_none());
        assert!(cache.fault().unwrap().contains("exceeds"));
    }

    #[test]
    fn test_drain_returns_units() {
        let cache = start(video_script(100), 5);
        std::thread::sleep(Duration::from_millis(30));
        cache.stop_caching();
        cache.join();
        assert_eq!(cache.drain(), 5);
        assert_eq!(cache.pool_stats().free, 5);
        assert!(cache.get_frame().is_none());
    }
}
