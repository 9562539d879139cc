//! In-memory decoders
//!
//! `ScriptedDecoder` replays a fixed list of frames and is what the demo
//! binary and the tests drive the engine with. `SyntheticStream` builds a
//! script of interleaved video, audio and subtitle frames at a fixed rate.

use crate::audio::AudioFormat;
use crate::error::{Error, Result};
use crate::media::decoder::FrameDecoder;
use crate::media::frame::{FrameInfo, FrameKind, StorageUnit};
use framesync_common::timing::TICK_RATE;
use std::time::Duration;
use tracing::{debug, trace};

/// Decoder that replays a pre-built frame list
#[derive(Debug, Clone)]
pub struct ScriptedDecoder {
    frames: Vec<(FrameInfo, Vec<u8>)>,
    cursor: usize,
    audio_format: Option<AudioFormat>,
    fail_at: Option<usize>,
    decode_delay: Option<Duration>,
}

impl ScriptedDecoder {
    /// Frames must be given in decode order (timestamps non-decreasing per kind)
    pub fn new(frames: Vec<(FrameInfo, Vec<u8>)>) -> Self {
        Self {
            frames,
            cursor: 0,
            audio_format: None,
            fail_at: None,
            decode_delay: None,
        }
    }

    pub fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = Some(format);
        self
    }

    /// Report a decoder fault instead of producing frame `index`
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Sleep before each decode to simulate a slow source
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = Some(delay);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the next frame to be produced
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn seek(&mut self, target_tick: i64) -> Result<()> {
        self.cursor = self
            .frames
            .iter()
            .position(|(info, _)| info.timestamp >= target_tick)
            .unwrap_or(self.frames.len());
        debug!("Scripted decoder seek to tick {} -> frame {}", target_tick, self.cursor);
        Ok(())
    }

    fn next_frame(&mut self, unit: &mut StorageUnit) -> Result<Option<FrameInfo>> {
        if let Some(delay) = self.decode_delay {
            std::thread::sleep(delay);
        }
        if self.fail_at == Some(self.cursor) {
            return Err(Error::DecoderFault(format!(
                "corrupt frame data at index {}",
                self.cursor
            )));
        }
        let Some((info, payload)) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        unit.fill(payload)?;
        trace!("Decoded frame {} ({} @ {})", self.cursor, info.kind, info.timestamp);
        self.cursor += 1;
        Ok(Some(*info))
    }

    fn duration_ticks(&self) -> i64 {
        self.frames.last().map(|(info, _)| info.timestamp).unwrap_or(0)
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        let has_audio = self.frames.iter().any(|(info, _)| info.kind == FrameKind::Audio);
        if has_audio {
            self.audio_format
        } else {
            None
        }
    }
}

/// Description of a generated test-pattern stream
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    pub duration_ms: i64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Audio format, None for a silent stream
    pub audio: Option<AudioFormat>,
    /// Emit a subtitle line every N milliseconds (0 = none)
    pub subtitle_every_ms: i64,
}

impl Default for SyntheticStream {
    fn default() -> Self {
        Self {
            duration_ms: 5000,
            fps: 15,
            width: 64,
            height: 48,
            audio: Some(AudioFormat::new(11_025, 1)),
            subtitle_every_ms: 1000,
        }
    }
}

impl SyntheticStream {
    /// Build the frame script. At each video tick the audio chunk covering
    /// that frame interval comes first, then the picture; subtitles share the
    /// tick of the video frame they start on.
    pub fn build(&self) -> ScriptedDecoder {
        let fps = self.fps.max(1) as i64;
        let frame_count = (self.duration_ms * fps / 1000).max(1);
        let picture_len = (self.width * self.height) as usize;
        let mut frames = Vec::new();
        let mut next_subtitle_ms = 0;

        for index in 0..frame_count {
            let timestamp = index * TICK_RATE / fps;
            let frame_ms = index * 1000 / fps;

            if let Some(format) = self.audio {
                let interval_ms = 1000 / fps;
                frames.push((FrameInfo::audio(timestamp), tone_chunk(format, index, interval_ms)));
            }

            let shade = (index % 256) as u8;
            frames.push((
                FrameInfo::video(timestamp, self.width, self.height),
                vec![shade; picture_len],
            ));

            if self.subtitle_every_ms > 0 && frame_ms >= next_subtitle_ms {
                let line = format!("[{:>6} ms] line {}", frame_ms, frame_ms / self.subtitle_every_ms);
                frames.push((FrameInfo::subtitle(timestamp), line.into_bytes()));
                next_subtitle_ms += self.subtitle_every_ms;
            }
        }

        debug!(
            "Synthetic stream: {} frames over {} ms ({} fps, audio={})",
            frames.len(),
            self.duration_ms,
            fps,
            self.audio.is_some()
        );

        let decoder = ScriptedDecoder::new(frames);
        match self.audio {
            Some(format) => decoder.with_audio_format(format),
            None => decoder,
        }
    }

    /// Largest payload the script produces, for sizing storage units
    pub fn max_payload(&self) -> usize {
        let picture = (self.width * self.height) as usize;
        let audio = self
            .audio
            .map(|f| f.bytes_for_ms(1000 / self.fps.max(1) as i64))
            .unwrap_or(0);
        picture.max(audio).max(64)
    }
}

/// Unsigned 8-bit square wave, one chunk per video interval
fn tone_chunk(format: AudioFormat, index: i64, interval_ms: i64) -> Vec<u8> {
    let frames = (format.sample_rate as i64 * interval_ms / 1000).max(1) as usize;
    let period = (format.sample_rate / 440).max(2) as usize;
    let offset = index as usize * frames;
    let mut chunk = Vec::with_capacity(frames * format.channels as usize);
    for i in 0..frames {
        let high = ((offset + i) / (period / 2)) % 2 == 0;
        let sample = if high { 0xA0 } else { 0x60 };
        for _ in 0..format.channels {
            chunk.push(sample);
        }
    }
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FramePool;

    fn drain(decoder: &mut ScriptedDecoder, pool: &mut FramePool) -> Vec<FrameInfo> {
        let mut infos = Vec::new();
        let mut unit = pool.acquire().unwrap();
        while let Some(info) = decoder.next_frame(&mut unit).unwrap() {
            infos.push(info);
        }
        pool.release(unit).unwrap();
        infos
    }

    #[test]
    fn test_scripted_replays_in_order() {
        let mut decoder = ScriptedDecoder::new(vec![
            (FrameInfo::video(0, 1, 1), vec![1]),
            (FrameInfo::video(100, 1, 1), vec![2]),
        ]);
        let mut pool = FramePool::new(1, 16);
        let infos = drain(&mut decoder, &mut pool);
        assert_eq!(infos.iter().map(|i| i.timestamp).collect::<Vec<_>>(), vec![0, 100]);
    }

    #[test]
    fn test_seek_and_reset() {
        let mut decoder = ScriptedDecoder::new(
            (0..10).map(|i| (FrameInfo::video(i * 10, 1, 1), vec![i as u8])).collect(),
        );
        decoder.seek(45).unwrap();
        assert_eq!(decoder.cursor(), 5);
        decoder.seek(1000).unwrap();
        assert_eq!(decoder.cursor(), 10);
        decoder.reset().unwrap();
        assert_eq!(decoder.cursor(), 0);
    }

    #[test]
    fn test_fault_injection() {
        let mut decoder = ScriptedDecoder::new(vec![
            (FrameInfo::video(0, 1, 1), vec![1]),
            (FrameInfo::video(1, 1, 1), vec![2]),
        ])
        .failing_at(1);
        let mut pool = FramePool::new(1, 16);
        let mut unit = pool.acquire().unwrap();
        assert!(decoder.next_frame(&mut unit).unwrap().is_some());
        assert!(matches!(decoder.next_frame(&mut unit), Err(Error::DecoderFault(_))));
    }

    #[test]
    fn test_synthetic_stream_is_timestamp_ordered() {
        let stream = SyntheticStream {
            duration_ms: 2000,
            fps: 10,
            ..Default::default()
        };
        let mut decoder = stream.build();
        let mut pool = FramePool::new(1, stream.max_payload());
        let infos = drain(&mut decoder, &mut pool);

        assert_eq!(infos.iter().filter(|i| i.kind == FrameKind::Video).count(), 20);
        assert_eq!(infos.iter().filter(|i| i.kind == FrameKind::Audio).count(), 20);
        assert_eq!(infos.iter().filter(|i| i.kind == FrameKind::Subtitle).count(), 2);
        assert!(infos.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(decoder.audio_format().is_some());
    }
}
