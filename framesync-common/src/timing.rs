//! Tick-based timing for frame presentation
//!
//! Every frame carries a timestamp in the stream's internal tick domain.
//! The tick rate is fixed at 65,536 ticks per second, so one tick is
//! roughly 15.26 microseconds.
//!
//! # Time representations
//!
//! 1. **Ticks (Internal)**: i64 values at 65,536 Hz, carried by frames and seek targets
//! 2. **Milliseconds (Display/API)**: i64 values for logging and controller input
//! 3. **Duration (Scheduling)**: `std::time::Duration` offsets added to a wall-clock anchor
//!
//! # Conversion rules
//!
//! - `ms = ticks * 1000 / TICK_RATE` (truncating)
//! - `ticks = ms * TICK_RATE / 1000` (truncating)
//!
//! Millisecond values that are multiples of 125 convert exactly in both
//! directions (65,536 / 1,000 reduces to 8,192 / 125).
//!
//! # Examples
//!
//! ```rust
//! use framesync_common::timing::*;
//!
//! assert_eq!(ms_to_ticks(1000), 65_536);
//! assert_eq!(ticks_to_ms(131_072), 2000);
//!
//! let offset = ticks_to_duration(32_768);
//! assert_eq!(offset.as_millis(), 500);
//! ```

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Tick rate: 65,536 ticks per second of wall time.
pub const TICK_RATE: i64 = 65_536;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

// ============================================================================
// Core Conversion Functions
// ============================================================================

/// Convert ticks to milliseconds using truncating division
///
/// # Examples
///
/// ```rust
/// use framesync_common::timing::ticks_to_ms;
///
/// assert_eq!(ticks_to_ms(0), 0);
/// assert_eq!(ticks_to_ms(65_536), 1000);
/// assert_eq!(ticks_to_ms(65), 0);   // 0.99 ms rounds down
/// assert_eq!(ticks_to_ms(66), 1);
/// assert_eq!(ticks_to_ms(-65_536), -1000);
/// ```
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks * 1000 / TICK_RATE
}

/// Convert milliseconds to ticks using truncating division
///
/// # Examples
///
/// ```rust
/// use framesync_common::timing::ms_to_ticks;
///
/// assert_eq!(ms_to_ticks(1000), 65_536);
/// assert_eq!(ms_to_ticks(125), 8_192);
/// assert_eq!(ms_to_ticks(1), 65);
/// ```
pub fn ms_to_ticks(milliseconds: i64) -> i64 {
    milliseconds * TICK_RATE / 1000
}

/// Convert a tick offset to a wall-clock duration
///
/// Negative offsets saturate to zero: a frame can never be scheduled before
/// the playback anchor.
///
/// ```rust
/// use framesync_common::timing::ticks_to_duration;
/// use std::time::Duration;
///
/// assert_eq!(ticks_to_duration(65_536), Duration::from_secs(1));
/// assert_eq!(ticks_to_duration(-10), Duration::ZERO);
/// ```
pub fn ticks_to_duration(ticks: i64) -> Duration {
    if ticks <= 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as i128 * NANOS_PER_SECOND / TICK_RATE as i128;
    Duration::from_nanos(nanos.min(u64::MAX as i128) as u64)
}

/// Convert a wall-clock duration to ticks (truncating, saturating at i64::MAX)
///
/// ```rust
/// use framesync_common::timing::duration_to_ticks;
/// use std::time::Duration;
///
/// assert_eq!(duration_to_ticks(Duration::from_millis(250)), 16_384);
/// ```
pub fn duration_to_ticks(duration: Duration) -> i64 {
    let ticks = duration.as_nanos() as i128 * TICK_RATE as i128 / NANOS_PER_SECOND;
    ticks.min(i64::MAX as i128) as i64
}

/// Convert ticks to seconds (f64), for display and logging only
///
/// ```rust
/// use framesync_common::timing::ticks_to_seconds;
///
/// assert_eq!(ticks_to_seconds(98_304), 1.5);
/// ```
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICK_RATE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_seconds_are_exact() {
        for secs in 0..10 {
            let ticks = secs * TICK_RATE;
            assert_eq!(ticks_to_ms(ticks), secs * 1000);
            assert_eq!(ms_to_ticks(secs * 1000), ticks);
            assert_eq!(ticks_to_duration(ticks), Duration::from_secs(secs as u64));
        }
    }

    #[test]
    fn test_multiples_of_125ms_roundtrip() {
        for ms in (0..5000).step_by(125) {
            assert_eq!(ticks_to_ms(ms_to_ticks(ms)), ms);
        }
    }

    #[test]
    fn test_duration_roundtrip_within_one_tick() {
        for ticks in [1_i64, 7, 655, 65_535, 1_000_000] {
            let back = duration_to_ticks(ticks_to_duration(ticks));
            assert!((ticks - back).abs() <= 1, "ticks={} back={}", ticks, back);
        }
    }
}
