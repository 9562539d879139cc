//! Audio stream format

use serde::{Deserialize, Serialize};

/// Unsigned 8-bit interleaved PCM format of a stream or device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Bytes per second of playback (one byte per sample per channel)
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.channels as usize
    }

    /// Bytes covering `ms` milliseconds, at least one sample frame
    pub fn bytes_for_ms(&self, ms: i64) -> usize {
        let frames = (self.sample_rate as i64 * ms.max(0) / 1000).max(1) as usize;
        frames * self.channels as usize
    }
}

/// Format and buffering requested from a device when opening it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub format: AudioFormat,
    /// Device-side buffer size in bytes
    pub buffer_bytes: usize,
    /// Preferred output device (None = default)
    pub device_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_math() {
        let mono = AudioFormat::new(22_050, 1);
        assert_eq!(mono.byte_rate(), 22_050);
        assert_eq!(mono.bytes_for_ms(100), 2205);

        let stereo = AudioFormat::new(11_025, 2);
        assert_eq!(stereo.bytes_for_ms(1000), 22_050);
        assert_eq!(stereo.bytes_for_ms(0), 2);
    }

    #[test]
    fn test_zero_channels_clamped() {
        assert_eq!(AudioFormat::new(8000, 0).channels, 1);
    }
}
