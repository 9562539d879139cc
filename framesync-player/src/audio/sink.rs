//! Audio sink worker
//!
//! Owns the output device for as long as the sink lives and turns queued PCM
//! chunks into device writes at whatever pace the device drains them,
//! independent of the scheduler's timing.
//!
//! # Loop
//!
//! 1. A partially written chunk is continued with as many bytes as the
//!    device accepts right now; the rest is kept for the next pass.
//! 2. Otherwise, while the device holds fewer than `low_water_bytes`, the
//!    next chunk is popped, converted per the resample policy, and started.
//! 3. Otherwise the worker sleeps for `idle_sleep` and retries.
//!
//! `finish_and_stop_audio` lets the loop run until the queue and the partial
//! chunk are exhausted; `stop_audio` ends it at the next pass and discards
//! whatever is queued.

use crate::audio::device::{AudioBackend, AudioDevice};
use crate::audio::queue::AudioQueue;
use crate::audio::resampler::Resampler;
use crate::audio::types::{AudioFormat, DeviceSpec};
use crate::error::{Error, Result};
use chrono::Utc;
use framesync_common::config::{AudioConfig, ResamplePolicy};
use framesync_common::events::EngineEvent;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Counters kept by the sink worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SinkStats {
    pub chunks_written: u64,
    pub bytes_written: u64,
    /// Chunks discarded because the queue was flushed after they were popped
    pub stale_dropped: u64,
}

#[derive(Debug, Default)]
struct SinkCounters {
    chunks_written: AtomicU64,
    bytes_written: AtomicU64,
    stale_dropped: AtomicU64,
}

/// State shared between the sink handle and its worker
struct SinkShared {
    queue: AudioQueue,
    stop: CancellationToken,
    finishing: AtomicBool,
    counters: SinkCounters,
    fault: Mutex<Option<String>>,
    session_id: Mutex<Uuid>,
}

impl SinkShared {
    fn session_id(&self) -> Uuid {
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settings the worker needs, copied out of the engine config
#[derive(Debug, Clone)]
struct SinkSettings {
    format: AudioFormat,
    policy: ResamplePolicy,
    canonical_rate: u32,
    low_water_bytes: usize,
    idle_sleep: Duration,
    drain_slack: Duration,
}

/// A chunk being written across several passes
struct PendingChunk {
    epoch: u64,
    data: Vec<u8>,
    offset: usize,
}

/// Handle to a running audio sink worker
pub struct AudioSink {
    shared: Arc<SinkShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    format: AudioFormat,
    device_rate: u32,
}

impl AudioSink {
    /// Spawn the sink thread and open the device on it.
    ///
    /// Returns only after the device opened, so a `DeviceUnavailable` error
    /// reaches the caller before any other worker is started. The wait is a
    /// plain blocking receive and is safe from inside an async runtime.
    pub fn open(
        backend: Arc<dyn AudioBackend>,
        format: AudioFormat,
        config: &AudioConfig,
        events: broadcast::Sender<EngineEvent>,
        session_id: Uuid,
    ) -> Result<Self> {
        let device_rate = Resampler::device_rate(config.policy, format, config.canonical_rate);
        let spec = DeviceSpec {
            format: AudioFormat::new(device_rate, format.channels),
            buffer_bytes: config.device_buffer_bytes,
            device_name: config.device_name.clone(),
        };
        let settings = SinkSettings {
            format,
            policy: config.policy,
            canonical_rate: config.canonical_rate,
            low_water_bytes: config.low_water_bytes,
            idle_sleep: config.idle_sleep(),
            drain_slack: Duration::from_millis(100),
        };
        let shared = Arc::new(SinkShared {
            queue: AudioQueue::new(),
            stop: CancellationToken::new(),
            finishing: AtomicBool::new(false),
            counters: SinkCounters::default(),
            fault: Mutex::new(None),
            session_id: Mutex::new(session_id),
        });

        info!(
            "Opening audio sink via {} backend: stream {} Hz x {} ch, device {} Hz, policy {}",
            backend.name(),
            format.sample_rate,
            format.channels,
            device_rate,
            config.policy
        );

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("framesync-audio".to_string())
            .spawn(move || {
                let device = match backend.open(&spec) {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(()));
                        device
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                Self::worker_loop(device, &worker_shared, &settings, &events);
            })?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(Error::DeviceUnavailable(
                "audio worker exited before reporting device state".to_string(),
            ))
        });
        if let Err(e) = opened {
            error!("Failed to open audio device: {}", e);
            let _ = handle.join();
            return Err(e);
        }

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            format,
            device_rate,
        })
    }

    fn worker_loop(
        mut device: Box<dyn AudioDevice>,
        shared: &SinkShared,
        settings: &SinkSettings,
        events: &broadcast::Sender<EngineEvent>,
    ) {
        debug!("Audio sink worker started");
        let mut pending: Option<PendingChunk> = None;

        loop {
            if shared.stop.is_cancelled() {
                debug!("Audio sink stopping");
                break;
            }

            // 1. Continue the partially written chunk
            if let Some(chunk) = pending.as_mut() {
                let queue = shared.queue.lock();
                if queue.epoch() != chunk.epoch {
                    shared.counters.stale_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("Discarding chunk popped before a flush");
                    pending = None;
                    continue;
                }

                let room = device.available();
                if room == 0 {
                    drop(queue);
                    std::thread::sleep(settings.idle_sleep);
                    continue;
                }

                let end = (chunk.offset + room).min(chunk.data.len());
                let written = device.write(&chunk.data[chunk.offset..end]);
                drop(queue);

                match written {
                    Ok(0) => {
                        Self::report_fault(
                            shared,
                            events,
                            "device accepted no data".to_string(),
                        );
                        break;
                    }
                    Ok(n) => {
                        chunk.offset += n;
                        shared.counters.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
                        if chunk.offset >= chunk.data.len() {
                            shared.counters.chunks_written.fetch_add(1, Ordering::Relaxed);
                            pending = None;
                        }
                    }
                    Err(e) => {
                        Self::report_fault(shared, events, e.to_string());
                        break;
                    }
                }
                continue;
            }

            // 2. Start the next chunk while the device is low
            if device.buffered() < settings.low_water_bytes {
                if let Some((epoch, chunk)) = shared.queue.pop() {
                    let data = Resampler::apply(
                        settings.policy,
                        chunk,
                        settings.format,
                        settings.canonical_rate,
                    );
                    if !data.is_empty() {
                        pending = Some(PendingChunk {
                            epoch,
                            data,
                            offset: 0,
                        });
                    }
                    continue;
                }

                if shared.finishing.load(Ordering::SeqCst) {
                    Self::wait_for_device_drain(device.as_mut(), shared, settings);
                    info!("Audio sink drained, stopping");
                    break;
                }
            }

            // 3. Nothing to do yet
            std::thread::sleep(settings.idle_sleep);
        }

        debug!("Audio sink worker exiting, closing device");
    }

    /// Give the device time to play out what it already holds
    fn wait_for_device_drain(
        device: &mut dyn AudioDevice,
        shared: &SinkShared,
        settings: &SinkSettings,
    ) {
        let byte_rate = settings.format.byte_rate().max(1) as u64;
        let buffered = device.buffered() as u64;
        let budget = Duration::from_millis(buffered * 1000 / byte_rate) + settings.drain_slack;
        let deadline = Instant::now() + budget;

        while device.buffered() > 0 && Instant::now() < deadline {
            if shared.stop.is_cancelled() {
                return;
            }
            std::thread::sleep(settings.idle_sleep);
        }
    }

    fn report_fault(shared: &SinkShared, events: &broadcast::Sender<EngineEvent>, message: String) {
        error!("Audio device write fault: {}", message);
        *shared.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.clone());
        let _ = events.send(EngineEvent::AudioDeviceFault {
            session_id: shared.session_id(),
            message,
            timestamp: Utc::now(),
        });
    }

    fn handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a PCM chunk at the stream's native rate
    pub fn push(&self, chunk: Vec<u8>) {
        self.shared.queue.push(chunk);
    }

    /// Stop at the next loop pass and discard the queue. Idempotent.
    pub fn stop_audio(&self) {
        self.shared.stop.cancel();
        let dropped = self.shared.queue.clear();
        if let Some(handle) = self.handle().take() {
            if handle.join().is_err() {
                warn!("Audio sink worker panicked");
            }
            debug!("Audio sink stopped ({} queued chunks discarded)", dropped);
        }
    }

    /// Let the worker play out the queue, then stop on its own.
    /// Returns immediately; the worker exits once drained.
    pub fn finish_and_stop_audio(&self) {
        debug!("Audio sink told to drain ({} chunks queued)", self.shared.queue.len());
        self.shared.finishing.store(true, Ordering::SeqCst);
    }

    /// Wait for the worker to exit (after `finish_and_stop_audio` or a fault)
    pub fn join(&self) {
        if let Some(handle) = self.handle().take() {
            if handle.join().is_err() {
                warn!("Audio sink worker panicked");
            }
        }
    }

    /// Discard queued audio without stopping the worker
    pub fn flush(&self) -> usize {
        let dropped = self.shared.queue.clear();
        debug!("Audio sink flushed ({} chunks discarded)", dropped);
        dropped
    }

    /// Attribute subsequent events to another session
    pub fn set_session(&self, session_id: Uuid) {
        *self
            .shared
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = session_id;
    }

    pub fn is_alive(&self) -> bool {
        self.handle()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// True while the sink can take chunks for a new session
    pub fn is_accepting(&self) -> bool {
        self.is_alive()
            && !self.shared.finishing.load(Ordering::SeqCst)
            && !self.shared.stop.is_cancelled()
    }

    pub fn fault(&self) -> Option<String> {
        self.shared
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stream format the sink was opened for
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Rate the device was opened at
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn queued_chunks(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn stats(&self) -> SinkStats {
        let counters = &self.shared.counters;
        SinkStats {
            chunks_written: counters.chunks_written.load(Ordering::Relaxed),
            bytes_written: counters.bytes_written.load(Ordering::Relaxed),
            stale_dropped: counters.stale_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.stop_audio();
    }
}
