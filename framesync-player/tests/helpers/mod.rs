//! Test helpers for framesync-player integration tests
//!
//! Provides:
//! - Frame script builders for the scripted decoder
//! - A controller harness wired to recording sinks and a capture device
//! - Polling helpers for asynchronous worker state

#![allow(dead_code)]

use framesync_common::EngineConfig;
use framesync_player::audio::{AudioBackend, AudioFormat, CaptureBackend};
use framesync_player::media::{
    DisplaySink, FrameInfo, RecordingDisplay, RecordingSubtitles, ScriptedDecoder, SubtitleSink,
};
use framesync_player::PlaybackController;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Audio format used by every scripted audio stream
pub const TEST_AUDIO: AudioFormat = AudioFormat {
    sample_rate: 11_025,
    channels: 1,
};

/// Engine config with small, fast-reacting settings
pub fn test_config(capacity: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cache.capacity = capacity;
    config.cache.unit_size = 4096;
    config.cache.pool_wait_ms = 2;
    config
}

/// One 2x2 video frame per tick, payload byte = index
pub fn video_script(ticks: &[i64]) -> ScriptedDecoder {
    ScriptedDecoder::new(
        ticks
            .iter()
            .enumerate()
            .map(|(i, &t)| (FrameInfo::video(t, 2, 2), vec![i as u8; 4]))
            .collect(),
    )
}

/// `count` frame pairs `interval_ticks` apart: an audio chunk whose every
/// byte is `index + 1`, then a 1x1 video frame.
pub fn tagged_av_script(count: usize, interval_ticks: i64, chunk_bytes: usize) -> ScriptedDecoder {
    let mut frames = Vec::with_capacity(count * 2);
    for i in 0..count {
        let ts = i as i64 * interval_ticks;
        frames.push((FrameInfo::audio(ts), vec![(i % 250) as u8 + 1; chunk_bytes]));
        frames.push((FrameInfo::video(ts, 1, 1), vec![i as u8]));
    }
    ScriptedDecoder::new(frames).with_audio_format(TEST_AUDIO)
}

/// Controller plus the sinks it presents to
pub struct Harness {
    pub controller: PlaybackController,
    pub display: Arc<RecordingDisplay>,
    pub subtitles: Arc<RecordingSubtitles>,
    pub backend: Arc<CaptureBackend>,
}

impl Harness {
    pub fn new(decoder: ScriptedDecoder, config: EngineConfig, backend: CaptureBackend) -> Self {
        let display = Arc::new(RecordingDisplay::new());
        let subtitles = Arc::new(RecordingSubtitles::new());
        let backend = Arc::new(backend);
        let controller = PlaybackController::new(
            Box::new(decoder),
            Arc::clone(&display) as Arc<dyn DisplaySink>,
            Arc::clone(&subtitles) as Arc<dyn SubtitleSink>,
            Arc::clone(&backend) as Arc<dyn AudioBackend>,
            config,
        );
        Self {
            controller,
            display,
            subtitles,
            backend,
        }
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
