//! Fixed-size storage unit pool
//!
//! Slots are index-addressed: `slots[i]` holds unit `i` while it is free and
//! is vacant while the unit is bound to an in-flight frame. The free list
//! holds the indices of occupied slots. The number of units is fixed at
//! construction and never grows, which makes the pool the cache's only
//! backpressure mechanism.
//!
//! Invariant: `free + bound == capacity`, where `bound` is the number of
//! vacant slots.

use crate::error::{Error, Result};
use crate::media::frame::StorageUnit;
use serde::Serialize;
use tracing::{debug, trace};

/// Pool occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    /// Units sitting in the pool
    pub free: usize,
    /// Units bound to frames that are queued or being consumed
    pub bound: usize,
}

impl PoolStats {
    /// True when the accounting invariant holds
    pub fn is_consistent(&self) -> bool {
        self.free + self.bound == self.capacity
    }
}

/// Free list of pre-allocated storage units
#[derive(Debug)]
pub struct FramePool {
    slots: Vec<Option<StorageUnit>>,
    free: Vec<usize>,
    unit_size: usize,
}

impl FramePool {
    /// Pre-allocate `capacity` units of `unit_size` bytes each
    pub fn new(capacity: usize, unit_size: usize) -> Self {
        debug!(
            "Creating frame pool: {} units x {} bytes ({:.1} KiB total)",
            capacity,
            unit_size,
            (capacity * unit_size) as f64 / 1024.0
        );

        let slots = (0..capacity)
            .map(|slot| Some(StorageUnit::new(slot, unit_size)))
            .collect();
        // Reverse so slot 0 is handed out first
        let free = (0..capacity).rev().collect();

        Self {
            slots,
            free,
            unit_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Take a free unit, or None while every unit is bound
    pub fn acquire(&mut self) -> Option<StorageUnit> {
        let slot = self.free.pop()?;
        let mut unit = self.slots[slot].take()?;
        unit.clear();
        trace!("Acquired storage unit {}", slot);
        Some(unit)
    }

    /// Return a unit to its slot
    pub fn release(&mut self, unit: StorageUnit) -> Result<()> {
        let slot = unit.slot();
        let capacity = self.slots.len();
        let Some(entry) = self.slots.get_mut(slot) else {
            return Err(Error::InvalidState(format!(
                "storage unit {} does not belong to a pool of {} units",
                slot, capacity
            )));
        };
        if entry.is_some() {
            return Err(Error::DoubleRelease { slot });
        }
        *entry = Some(unit);
        self.free.push(slot);
        trace!("Released storage unit {}", slot);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.slots.len(),
            free: self.free.len(),
            bound: self.slots.iter().filter(|s| s.is_none()).count(),
        }
    }
}
