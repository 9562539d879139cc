//! framesync demo player - Main entry point
//!
//! Plays a generated test-pattern stream (video, audio and subtitles)
//! through the full engine and prints the session statistics as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use framesync_common::config::ResamplePolicy;
use framesync_common::timing::ms_to_ticks;
use framesync_common::EngineConfig;
use framesync_player::audio::{AudioBackend, AudioFormat, CaptureBackend};
use framesync_player::media::{LogDisplay, LogSubtitles, SyntheticStream};
use framesync_player::PlaybackController;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for framesync
#[derive(Parser, Debug)]
#[command(name = "framesync")]
#[command(about = "Frame-accurate playback engine demo")]
#[command(version)]
struct Args {
    /// Configuration file (overrides FRAMESYNC_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Length of the generated stream in seconds
    #[arg(short, long, default_value = "5")]
    seconds: u64,

    /// Video frame rate of the generated stream
    #[arg(long, default_value = "15")]
    fps: u32,

    /// Generate a stream without audio frames
    #[arg(long)]
    no_audio: bool,

    /// Resample policy: resample, native or none
    #[arg(long)]
    policy: Option<ResamplePolicy>,

    /// Seek to this position shortly after playback starts
    #[arg(long)]
    seek_to_ms: Option<i64>,

    /// Storage pool capacity (frames decoded ahead)
    #[arg(long)]
    capacity: Option<usize>,

    /// Audio output: capture (in-memory), or cpal when built with `cpal-output`
    #[arg(long, default_value = "capture")]
    output: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(policy) = args.policy {
        config.audio.policy = policy;
    }
    if let Some(capacity) = args.capacity {
        config.cache.capacity = capacity;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting framesync {} (git {}, built {}, {}, outputs: {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
        env!("FRAMESYNC_AUDIO_OUTPUTS")
    );

    let stream = SyntheticStream {
        duration_ms: args.seconds as i64 * 1000,
        fps: args.fps,
        audio: if args.no_audio {
            None
        } else {
            Some(AudioFormat::new(11_025, 1))
        },
        ..Default::default()
    };
    config.cache.unit_size = config.cache.unit_size.max(stream.max_payload());
    config.validate().context("Invalid configuration")?;

    let backend: Arc<dyn AudioBackend> = match args.output.as_str() {
        "capture" => Arc::new(CaptureBackend::paced()),
        #[cfg(feature = "cpal-output")]
        "cpal" => Arc::new(framesync_player::audio::CpalBackend::new()),
        other => bail!(
            "Unsupported audio output '{}' (available: {})",
            other,
            env!("FRAMESYNC_AUDIO_OUTPUTS")
        ),
    };

    info!(
        "Stream: {} s at {} fps, audio={}, policy={}, capacity={}",
        args.seconds,
        args.fps,
        !args.no_audio,
        config.audio.policy,
        config.cache.capacity
    );

    let controller = PlaybackController::new(
        Box::new(stream.build()),
        Arc::new(LogDisplay::new()),
        Arc::new(LogSubtitles),
        backend,
        config,
    );

    // Log engine events until the controller goes away
    let mut events = controller.subscribe_events();
    let event_logger = std::thread::Builder::new()
        .name("framesync-events".to_string())
        .spawn(move || loop {
            match events.blocking_recv() {
                Ok(event) if event.is_fault() => warn!("Engine event: {:?}", event),
                Ok(event) => info!("Engine event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Event logger skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        })
        .context("Failed to spawn event logger")?;

    controller.play().context("Failed to start playback")?;

    if let Some(ms) = args.seek_to_ms {
        std::thread::sleep(Duration::from_millis(500));
        controller
            .seek(ms_to_ticks(ms))
            .context("Seek failed")?;
    }

    let budget = Duration::from_secs(args.seconds + 10);
    if !controller.wait_until_idle(budget) {
        warn!("Playback did not finish within {:?}, stopping", budget);
    }
    controller.wait_for_audio_drain(Duration::from_secs(5));
    controller.stop();

    let report = serde_json::json!({
        "scheduler": controller.scheduler_stats(),
        "pool": controller.pool_stats(),
        "position_ticks": controller.position_ticks(),
        "last_error": controller.last_error(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    drop(controller);
    let _ = event_logger.join();

    info!("Shutdown complete");
    Ok(())
}
