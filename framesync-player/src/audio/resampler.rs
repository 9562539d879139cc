//! Linear-interpolation resampling for unsigned 8-bit PCM
//!
//! Given `n` input sample frames at `r_in`, produces `m = floor(n * r_out / r_in)`
//! output frames. Output frame `i` sits at input position
//! `p = i * (n - 1) / (m - 1)` and blends the two neighbouring input samples
//! with an 8-bit fractional weight:
//!
//! ```text
//! out = ((a * (256 - w) + b * w) / 2) / 128
//! ```
//!
//! The halving step is kept as written. For non-negative integers
//! `(x / 2) / 128 == x / 256`, so the result is the same as a plain
//! truncating 8-bit-weight interpolation: no extra precision is lost, and a
//! constant input yields the same constant.
//!
//! All arithmetic is integer; results do not depend on float rounding.

use crate::audio::types::AudioFormat;
use framesync_common::config::ResamplePolicy;
use tracing::trace;

/// Stateless 8-bit linear resampler
pub struct Resampler;

impl Resampler {
    /// Number of output frames for `input_frames` frames converted between rates
    pub fn output_len(input_frames: usize, input_rate: u32, output_rate: u32) -> usize {
        if input_rate == 0 {
            return 0;
        }
        (input_frames as u64 * output_rate as u64 / input_rate as u64) as usize
    }

    /// Resample interleaved unsigned 8-bit samples.
    ///
    /// A trailing partial sample frame (fewer bytes than `channels`) is dropped.
    pub fn resample(input: &[u8], input_rate: u32, output_rate: u32, channels: u16) -> Vec<u8> {
        let channels = channels.max(1) as usize;
        let n = input.len() / channels;
        let m = Self::output_len(n, input_rate, output_rate);

        if n == 0 || m == 0 {
            return Vec::new();
        }

        let mut output = Vec::with_capacity(m * channels);
        let span = (n - 1) as u64;
        let steps = (m - 1) as u64;

        for i in 0..m as u64 {
            // Fractional position i * (n-1) / (m-1) as integer + 8-bit weight
            let (index, weight) = if steps == 0 {
                (0, 0)
            } else {
                let scaled = i * span;
                let index = (scaled / steps) as usize;
                let weight = ((scaled % steps) * 256 / steps) as u32;
                (index, weight)
            };
            let next = (index + 1).min(n - 1);

            for ch in 0..channels {
                let a = input[index * channels + ch] as u32;
                let b = input[next * channels + ch] as u32;
                output.push(Self::blend(a, b, weight));
            }
        }

        trace!(
            "Resampled {} frames @ {}Hz -> {} frames @ {}Hz",
            n,
            input_rate,
            m,
            output_rate
        );

        output
    }

    /// Weighted blend, truncated (halving then /128 equals /256)
    fn blend(a: u32, b: u32, weight: u32) -> u8 {
        let mixed = a * (256 - weight) + b * weight;
        let halved = mixed / 2;
        (halved / 128).min(255) as u8
    }

    /// Rate the output device is opened at under `policy`
    pub fn device_rate(policy: ResamplePolicy, format: AudioFormat, canonical_rate: u32) -> u32 {
        match policy {
            ResamplePolicy::Native => format.sample_rate,
            ResamplePolicy::Resample | ResamplePolicy::None => canonical_rate,
        }
    }

    /// Convert one queued chunk as `policy` requires before it is written
    pub fn apply(
        policy: ResamplePolicy,
        chunk: Vec<u8>,
        format: AudioFormat,
        canonical_rate: u32,
    ) -> Vec<u8> {
        match policy {
            ResamplePolicy::Resample if format.sample_rate != canonical_rate => {
                Self::resample(&chunk, format.sample_rate, canonical_rate, format.channels)
            }
            _ => chunk,
        }
    }
}
