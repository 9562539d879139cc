//! Audio chunk queue between the scheduler and the audio sink
//!
//! Unbounded: once a chunk is accepted it is never dropped except by an
//! explicit `clear`. Memory is bounded upstream by the frame pool.
//!
//! Every `clear` bumps an epoch. The sink tags each chunk it pops with the
//! epoch it was popped under and compares that tag against the current
//! epoch while holding the queue lock for the device write, so a chunk the
//! sink already took cannot reach the device once `clear` has returned.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub(crate) struct QueueInner {
    chunks: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    epoch: u64,
}

impl QueueInner {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// FIFO of owned PCM chunks
#[derive(Debug, Default)]
pub struct AudioQueue {
    inner: Mutex<QueueInner>,
}

impl AudioQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner.queued_bytes += chunk.len();
        inner.chunks.push_back(chunk);
    }

    /// Next chunk together with the epoch it was taken under
    pub fn pop(&self) -> Option<(u64, Vec<u8>)> {
        let mut inner = self.lock();
        let chunk = inner.chunks.pop_front()?;
        inner.queued_bytes -= chunk.len();
        Some((inner.epoch, chunk))
    }

    /// Drop every queued chunk and invalidate chunks already popped.
    /// Returns the number of chunks dropped from the queue.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.chunks.len();
        inner.chunks.clear();
        inner.queued_bytes = 0;
        inner.epoch += 1;
        dropped
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    pub fn queued_bytes(&self) -> usize {
        self.lock().queued_bytes
    }
}
