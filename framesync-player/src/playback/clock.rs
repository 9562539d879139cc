//! Playback clock
//!
//! Maps frame timestamps to wall-clock deadlines relative to the first frame
//! of the session:
//!
//! ```text
//! deadline = start_wall + (timestamp - start_frame_time) * 1000 / TICK_RATE  [ms]
//! ```
//!
//! Only frames that are waited on (video, subtitles) go through `schedule`
//! and count as the "previous frame" for simultaneity. Audio frames are
//! dispatched at once and only `observe` the clock, so an audio chunk at
//! tick T never lets the picture at T skip its deadline.

use framesync_common::timing::ticks_to_duration;
use std::time::Instant;

/// When a frame should be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTiming {
    /// No wait: first frame, or simultaneous with the previous timed frame
    Immediate,
    /// Wall-clock deadline
    At(Instant),
}

#[derive(Debug, Default)]
pub struct PlaybackClock {
    start_wall: Option<Instant>,
    start_frame_time: i64,
    last_frame_time: Option<i64>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timing for the next timed frame in decode order. The first frame of the
    /// session (timed or observed) anchors the clock at `now`.
    ///
    /// ```
    /// use framesync_player::playback::clock::{FrameTiming, PlaybackClock};
    /// use std::time::{Duration, Instant};
    ///
    /// let mut clock = PlaybackClock::new();
    /// let start = Instant::now();
    /// assert_eq!(clock.schedule(0, start), FrameTiming::Immediate);
    /// assert_eq!(clock.schedule(0, start), FrameTiming::Immediate);
    /// assert_eq!(
    ///     clock.schedule(65_536, start),
    ///     FrameTiming::At(start + Duration::from_secs(1))
    /// );
    /// ```
    pub fn schedule(&mut self, timestamp: i64, now: Instant) -> FrameTiming {
        let Some(start_wall) = self.start_wall else {
            self.anchor(timestamp, now);
            self.last_frame_time = Some(timestamp);
            return FrameTiming::Immediate;
        };

        let previous = self.last_frame_time.replace(timestamp);
        if previous == Some(timestamp) {
            return FrameTiming::Immediate;
        }

        FrameTiming::At(start_wall + ticks_to_duration(timestamp - self.start_frame_time))
    }

    /// Note an untimed frame: anchors the clock if it is the first frame,
    /// leaves the previous timed frame untouched.
    pub fn observe(&mut self, timestamp: i64, now: Instant) {
        if self.start_wall.is_none() {
            self.anchor(timestamp, now);
        }
    }

    fn anchor(&mut self, timestamp: i64, now: Instant) {
        self.start_wall = Some(now);
        self.start_frame_time = timestamp;
    }

    pub fn is_started(&self) -> bool {
        self.start_wall.is_some()
    }

    pub fn start_frame_time(&self) -> i64 {
        self.start_frame_time
    }

    /// Timestamp of the last timed frame
    pub fn last_frame_time(&self) -> Option<i64> {
        self.last_frame_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_deadlines_relative_to_first_frame() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        assert_eq!(clock.schedule(131_072, start), FrameTiming::Immediate);
        assert_eq!(
            clock.schedule(131_072 + 32_768, start + Duration::from_millis(3)),
            FrameTiming::At(start + Duration::from_millis(500))
        );
        assert_eq!(clock.start_frame_time(), 131_072);
    }

    #[test]
    fn test_earlier_timestamp_due_at_start() {
        // Kinds may interleave, an earlier audio tick maps to the anchor
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.schedule(1000, start);
        assert_eq!(clock.schedule(500, start), FrameTiming::At(start));
    }

    #[test]
    fn test_only_matching_previous_is_immediate() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.schedule(0, start);
        assert!(matches!(clock.schedule(10, start), FrameTiming::At(_)));
        assert_eq!(clock.schedule(10, start), FrameTiming::Immediate);
        assert!(matches!(clock.schedule(0, start), FrameTiming::At(_)));
        assert_eq!(clock.last_frame_time(), Some(0));
    }

    #[test]
    fn test_observed_audio_does_not_make_video_simultaneous() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.observe(0, start);
        assert!(clock.is_started());
        assert_eq!(clock.last_frame_time(), None);

        // Picture sharing the anchor tick is due at the anchor
        assert_eq!(clock.schedule(0, start), FrameTiming::At(start));

        clock.observe(32_768, start);
        assert_eq!(
            clock.schedule(32_768, start),
            FrameTiming::At(start + Duration::from_millis(500))
        );
        assert_eq!(clock.last_frame_time(), Some(32_768));
    }
}
