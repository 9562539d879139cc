//! Resample Performance Benchmark
//!
//! Measures integer linear-interpolation throughput on the audio thread's
//! hot path, plus storage-pool acquire/release cost.
//!
//! **Goal:** Converting one chunk must take a small fraction of its duration
//! **Target:** >50x realtime for 8-bit mono and stereo
//!
//! ## Test Scenarios
//!
//! - 11025 Hz → 22050 Hz mono (ratio: 2.0)
//! - 44100 Hz → 22050 Hz stereo (ratio: 0.5)
//! - 8000 Hz → 22050 Hz mono (ratio: 2.75625)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use framesync_player::audio::Resampler;
use framesync_player::media::FramePool;
use std::time::Instant;

/// Square wave test signal, unsigned 8-bit interleaved
fn test_signal(sample_rate: u32, channels: u16, duration_s: f64) -> Vec<u8> {
    let frames = (duration_s * sample_rate as f64) as usize;
    let period = (sample_rate / 440).max(2) as usize;
    (0..frames)
        .flat_map(|i| {
            let sample = if (i / (period / 2)) % 2 == 0 { 0xA0 } else { 0x60 };
            std::iter::repeat(sample).take(channels as usize)
        })
        .collect()
}

fn bench_resample_rates(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_performance");
    let duration_s = 10.0;

    for (name, in_rate, out_rate, channels) in [
        ("11k_to_22k_mono", 11_025u32, 22_050u32, 1u16),
        ("44k_to_22k_stereo", 44_100, 22_050, 2),
        ("8k_to_22k_mono", 8_000, 22_050, 1),
    ] {
        let input = test_signal(in_rate, channels, duration_s);
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_function(name, |b| {
            b.iter(|| {
                let start = Instant::now();
                let output = Resampler::resample(black_box(&input), in_rate, out_rate, channels);
                let realtime_factor = duration_s / start.elapsed().as_secs_f64();

                assert!(
                    realtime_factor > 50.0,
                    "{}: {:.2}x is below 50x realtime target",
                    name,
                    realtime_factor
                );
                black_box(output);
            });
        });
    }

    group.finish();
}

/// Chunk sizes the sink sees for common frame rates at 11025 Hz mono
fn bench_resample_chunk_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_chunk_sizes");

    for (name, bytes) in [("15fps", 735usize), ("25fps", 441), ("30fps", 367), ("1s", 11_025)] {
        let input = test_signal(11_025, 1, bytes as f64 / 11_025.0);

        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| black_box(Resampler::resample(black_box(&input), 11_025, 22_050, 1)));
        });
    }

    group.finish();
}

fn bench_pool_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_pool");

    for capacity in [4usize, 32, 256] {
        group.bench_with_input(BenchmarkId::new("acquire_release", capacity), &capacity, |b, &cap| {
            let mut pool = FramePool::new(cap, 4096);
            b.iter(|| {
                let mut units = Vec::with_capacity(cap);
                while let Some(unit) = pool.acquire() {
                    units.push(unit);
                }
                for unit in units {
                    pool.release(black_box(unit)).unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_resample_rates,
    bench_resample_chunk_sizes,
    bench_pool_cycle,
);
criterion_main!(benches);
