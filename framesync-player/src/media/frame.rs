//! Frame and storage unit model
//!
//! A `StorageUnit` is a pre-allocated byte buffer owned by the frame pool.
//! The decoder fills a unit, and the cache wraps the filled unit together
//! with its `FrameInfo` into a `Frame`. Whoever holds the `Frame` owns the
//! unit; releasing the frame moves the unit back into the pool.

use crate::error::{Error, Result};
use std::borrow::Cow;

/// Frame kind carried by the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Video,
    Audio,
    Subtitle,
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Video => write!(f, "video"),
            FrameKind::Audio => write!(f, "audio"),
            FrameKind::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// Metadata the decoder reports for the unit it just filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Presentation time in ticks (65,536 per second)
    pub timestamp: i64,
    pub kind: FrameKind,
    /// Picture dimensions (zero for audio and subtitle frames)
    pub width: u32,
    pub height: u32,
}

impl FrameInfo {
    pub fn video(timestamp: i64, width: u32, height: u32) -> Self {
        Self {
            timestamp,
            kind: FrameKind::Video,
            width,
            height,
        }
    }

    pub fn audio(timestamp: i64) -> Self {
        Self {
            timestamp,
            kind: FrameKind::Audio,
            width: 0,
            height: 0,
        }
    }

    pub fn subtitle(timestamp: i64) -> Self {
        Self {
            timestamp,
            kind: FrameKind::Subtitle,
            width: 0,
            height: 0,
        }
    }
}

/// Reusable, fixed-capacity decode buffer bound to one pool slot
#[derive(Debug)]
pub struct StorageUnit {
    slot: usize,
    buf: Vec<u8>,
    len: usize,
}

impl StorageUnit {
    pub(crate) fn new(slot: usize, capacity: usize) -> Self {
        Self {
            slot,
            buf: vec![0; capacity],
            len: 0,
        }
    }

    /// Pool slot this unit belongs to
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Worst-case payload size this unit can hold
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently holding payload
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy a decoded payload into the unit, replacing previous contents
    pub fn fill(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.buf.len() {
            return Err(Error::UnitOverflow {
                needed: payload.len(),
                capacity: self.buf.len(),
            });
        }
        self.buf[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        Ok(())
    }

    /// Writable view of the whole buffer for decoders that decode in place.
    /// Call `set_len` afterwards.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.buf.len() {
            return Err(Error::UnitOverflow {
                needed: len,
                capacity: self.buf.len(),
            });
        }
        self.len = len;
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}

/// Picture payload handed to the display sink
#[derive(Debug, Clone, Copy)]
pub struct PictureRef<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Kind-specific view over a frame's storage unit
#[derive(Debug)]
pub enum Payload<'a> {
    Picture(PictureRef<'a>),
    Pcm(&'a [u8]),
    Text(Cow<'a, str>),
}

/// A decoded frame: one storage unit plus its metadata
#[derive(Debug)]
pub struct Frame {
    info: FrameInfo,
    unit: StorageUnit,
}

impl Frame {
    pub fn new(unit: StorageUnit, info: FrameInfo) -> Self {
        Self { info, unit }
    }

    pub fn timestamp(&self) -> i64 {
        self.info.timestamp
    }

    pub fn kind(&self) -> FrameKind {
        self.info.kind
    }

    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// Pool slot of the bound storage unit
    pub fn slot(&self) -> usize {
        self.unit.slot()
    }

    pub fn payload(&self) -> Payload<'_> {
        let data = self.unit.data();
        match self.info.kind {
            FrameKind::Video => Payload::Picture(PictureRef {
                width: self.info.width,
                height: self.info.height,
                data,
            }),
            FrameKind::Audio => Payload::Pcm(data),
            FrameKind::Subtitle => Payload::Text(String::from_utf8_lossy(data)),
        }
    }

    /// Give up the frame and recover its storage unit
    pub fn into_unit(self) -> StorageUnit {
        self.unit
    }
}
