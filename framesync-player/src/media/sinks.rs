//! Presentation sinks
//!
//! The scheduler thread calls `present` and `append` directly, so
//! implementations must return quickly (well under one frame interval) and
//! be shareable across sessions.

use crate::media::frame::PictureRef;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};

/// Passive picture surface
pub trait DisplaySink: Send + Sync {
    fn present(&self, picture: PictureRef<'_>);
}

/// Subtitle text surface
pub trait SubtitleSink: Send + Sync {
    fn append(&self, text: &str);
}

/// Display sink that only logs and counts presentations
#[derive(Debug, Default)]
pub struct LogDisplay {
    presented: AtomicU64,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }
}

impl DisplaySink for LogDisplay {
    fn present(&self, picture: PictureRef<'_>) {
        let count = self.presented.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Presented picture #{} ({}x{}, {} bytes)",
            count,
            picture.width,
            picture.height,
            picture.data.len()
        );
    }
}

/// Subtitle sink that writes each line to the log
#[derive(Debug, Default)]
pub struct LogSubtitles;

impl SubtitleSink for LogSubtitles {
    fn append(&self, text: &str) {
        info!("Subtitle: {}", text);
    }
}

/// One presentation captured by `RecordingDisplay`
#[derive(Debug, Clone)]
pub struct PresentedPicture {
    pub at: Instant,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Display sink that keeps every picture with its presentation instant
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pictures: Mutex<Vec<PresentedPicture>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pictures(&self) -> Vec<PresentedPicture> {
        self.pictures.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.pictures.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl DisplaySink for RecordingDisplay {
    fn present(&self, picture: PictureRef<'_>) {
        let entry = PresentedPicture {
            at: Instant::now(),
            width: picture.width,
            height: picture.height,
            data: picture.data.to_vec(),
        };
        if let Ok(mut pictures) = self.pictures.lock() {
            pictures.push(entry);
        }
    }
}

/// Subtitle sink that keeps every appended line
#[derive(Debug, Default)]
pub struct RecordingSubtitles {
    lines: Mutex<Vec<(Instant, String)>>,
}

impl RecordingSubtitles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.iter().map(|(_, text)| text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn timed_lines(&self) -> Vec<(Instant, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl SubtitleSink for RecordingSubtitles {
    fn append(&self, text: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((Instant::now(), text.to_string()));
        }
    }
}
