//! Audio output device abstraction
//!
//! A backend opens devices; a device accepts unsigned 8-bit PCM bytes into
//! its own bounded buffer and drains them at its playback rate. Devices are
//! opened and used on the audio sink thread only, so `AudioDevice` is not
//! required to be `Send` (cpal streams are not).
//!
//! `CaptureBackend` is an in-memory device used by the demo binary when no
//! sound card is wanted, and by tests to observe exactly what reached the
//! device and when.

use crate::audio::types::DeviceSpec;
use crate::error::{Error, Result};
use ringbuf::{traits::*, HeapRb};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

/// Opens output devices
pub trait AudioBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Open a device for `spec`; fails with `DeviceUnavailable`
    fn open(&self, spec: &DeviceSpec) -> Result<Box<dyn AudioDevice>>;
}

/// An open output device
pub trait AudioDevice {
    /// Bytes the device will accept right now without blocking
    fn available(&mut self) -> usize;

    /// Bytes written but not yet played
    fn buffered(&mut self) -> usize;

    /// Write up to `data.len()` bytes, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;
}

/// How the capture device consumes its buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Drain at the device's byte rate, like real hardware
    Paced,
    /// Every byte is consumed as soon as it is written
    Instant,
}

/// One accepted write as seen by the capture device
#[derive(Debug, Clone)]
pub struct CapturedWrite {
    pub at: Instant,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct CaptureLog {
    writes: Vec<CapturedWrite>,
    total_bytes: usize,
    opens: usize,
    last_spec: Option<DeviceSpec>,
}

/// In-memory backend that records every byte written
#[derive(Debug)]
pub struct CaptureBackend {
    mode: DrainMode,
    fail_open: Option<String>,
    fail_after_bytes: Option<usize>,
    log: Arc<Mutex<CaptureLog>>,
}

impl CaptureBackend {
    pub fn new(mode: DrainMode) -> Self {
        Self {
            mode,
            fail_open: None,
            fail_after_bytes: None,
            log: Arc::new(Mutex::new(CaptureLog::default())),
        }
    }

    /// Device that drains in real time
    pub fn paced() -> Self {
        Self::new(DrainMode::Paced)
    }

    /// Device that never fills up
    pub fn instant() -> Self {
        Self::new(DrainMode::Instant)
    }

    /// Every `open` fails with `DeviceUnavailable(reason)`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut backend = Self::new(DrainMode::Instant);
        backend.fail_open = Some(reason.into());
        backend
    }

    /// Stop accepting data (zero-progress writes) after `bytes` bytes
    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after_bytes = Some(bytes);
        self
    }

    fn log(&self) -> MutexGuard<'_, CaptureLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn writes(&self) -> Vec<CapturedWrite> {
        self.log().writes.clone()
    }

    /// Everything the device accepted, concatenated
    pub fn bytes(&self) -> Vec<u8> {
        self.log()
            .writes
            .iter()
            .flat_map(|w| w.data.iter().copied())
            .collect()
    }

    pub fn total_bytes(&self) -> usize {
        self.log().total_bytes
    }

    pub fn open_count(&self) -> usize {
        self.log().opens
    }

    pub fn last_spec(&self) -> Option<DeviceSpec> {
        self.log().last_spec.clone()
    }
}

impl AudioBackend for CaptureBackend {
    fn name(&self) -> &str {
        "capture"
    }

    fn open(&self, spec: &DeviceSpec) -> Result<Box<dyn AudioDevice>> {
        if let Some(reason) = &self.fail_open {
            return Err(Error::DeviceUnavailable(reason.clone()));
        }
        {
            let mut log = self.log();
            log.opens += 1;
            log.last_spec = Some(spec.clone());
        }
        info!(
            "Opened capture device: {} Hz, {} ch, {} byte buffer ({:?})",
            spec.format.sample_rate, spec.format.channels, spec.buffer_bytes, self.mode
        );
        Ok(Box::new(CaptureDevice {
            ring: HeapRb::new(spec.buffer_bytes.max(1)),
            byte_rate: spec.format.byte_rate().max(1) as u128,
            mode: self.mode,
            anchor: Instant::now(),
            drained: 0,
            accepted: 0,
            fail_after_bytes: self.fail_after_bytes,
            log: Arc::clone(&self.log),
        }))
    }
}

struct CaptureDevice {
    ring: HeapRb<u8>,
    byte_rate: u128,
    mode: DrainMode,
    anchor: Instant,
    drained: u128,
    accepted: usize,
    fail_after_bytes: Option<usize>,
    log: Arc<Mutex<CaptureLog>>,
}

impl CaptureDevice {
    /// Consume what the device has played since the last call
    fn drain(&mut self) {
        let occupied = self.ring.occupied_len();
        match self.mode {
            DrainMode::Instant => {
                self.ring.skip(occupied);
            }
            DrainMode::Paced => {
                if occupied == 0 {
                    return;
                }
                let due = self.anchor.elapsed().as_nanos() * self.byte_rate / 1_000_000_000;
                let step = (due - self.drained).min(occupied as u128) as usize;
                self.ring.skip(step);
                self.drained = due;
            }
        }
    }
}

impl AudioDevice for CaptureDevice {
    fn available(&mut self) -> usize {
        self.drain();
        self.ring.vacant_len()
    }

    fn buffered(&mut self) -> usize {
        self.drain();
        self.ring.occupied_len()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.drain();

        let mut allowed = data.len();
        if let Some(limit) = self.fail_after_bytes {
            allowed = allowed.min(limit.saturating_sub(self.accepted));
        }
        if allowed == 0 {
            return Ok(0);
        }

        if self.ring.is_empty() {
            // Idle time does not count as playback
            self.anchor = Instant::now();
            self.drained = 0;
        }
        let written = self.ring.push_slice(&data[..allowed]);
        self.accepted += written;

        if written > 0 {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            log.total_bytes += written;
            log.writes.push(CapturedWrite {
                at: Instant::now(),
                data: data[..written].to_vec(),
            });
        }
        debug!("Capture device accepted {} of {} bytes", written, data.len());
        Ok(written)
    }
}
