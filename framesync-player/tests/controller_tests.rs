//! End-to-end playback sessions through the controller
//!
//! Wall-clock sensitive tests run serially.

mod helpers;

use framesync_common::timing::ms_to_ticks;
use framesync_common::{EngineEvent, PlaybackState};
use framesync_player::audio::CaptureBackend;
use framesync_player::media::FrameInfo;
use framesync_player::media::ScriptedDecoder;
use framesync_player::Error;
use helpers::{tagged_av_script, test_config, video_script, wait_for, Harness, TEST_AUDIO};
use serial_test::serial;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Scenario A: three video frames one second apart with a two-unit pool
#[test]
#[serial]
fn test_scenario_a_one_second_spacing() {
    let harness = Harness::new(
        video_script(&[0, 65_536, 131_072]),
        test_config(2),
        CaptureBackend::instant(),
    );
    harness.controller.play().unwrap();
    assert!(harness.controller.wait_until_idle(Duration::from_secs(5)));

    let pictures = harness.display.pictures();
    assert_eq!(pictures.len(), 3);
    for (k, picture) in pictures.iter().enumerate().skip(1) {
        let offset = picture.at - pictures[0].at;
        let expected = Duration::from_secs(k as u64);
        assert!(
            offset + Duration::from_millis(1) >= expected && offset < expected + Duration::from_millis(10),
            "frame {} presented at {:?}",
            k,
            offset
        );
    }
    assert_eq!(harness.controller.position_ticks(), 131_072);
    assert_eq!(harness.controller.scheduler_stats().underruns, 0);
}

/// Scenario B: audio and video sharing tick 0 go out back to back
#[test]
#[serial]
fn test_scenario_b_shared_tick_dispatched_together() {
    let decoder = ScriptedDecoder::new(vec![
        (FrameInfo::audio(0), vec![0x80; 1102]),
        (FrameInfo::video(0, 1, 1), vec![0]),
        (FrameInfo::subtitle(0), b"hello".to_vec()),
        (FrameInfo::video(ms_to_ticks(300), 1, 1), vec![1]),
    ])
    .with_audio_format(TEST_AUDIO);
    let harness = Harness::new(decoder, test_config(4), CaptureBackend::instant());

    let started = Instant::now();
    harness.controller.play().unwrap();
    assert!(harness.controller.wait_until_idle(Duration::from_secs(5)));
    assert!(harness.controller.wait_for_audio_drain(Duration::from_secs(2)));

    let pictures = harness.display.pictures();
    let lines = harness.subtitles.timed_lines();
    let first_write = harness.backend.writes().first().map(|w| w.at).expect("audio reached device");

    // Video at tick 0 right away, subtitle and audio alongside it
    assert!(pictures[0].at.duration_since(started) < Duration::from_millis(50));
    assert!(lines[0].0.duration_since(pictures[0].at) < Duration::from_millis(5));
    assert!(first_write.duration_since(started) < Duration::from_millis(60));

    // The next tick still waits for its deadline
    assert!(pictures[1].at - pictures[0].at >= Duration::from_millis(290));

    let stats = harness.controller.scheduler_stats();
    assert_eq!((stats.audio_frames, stats.video_frames, stats.subtitle_frames), (1, 2, 1));
}

/// Scenario C: stop mid-playback leaves no worker running and no unit leaked
#[test]
#[serial]
fn test_scenario_c_stop_mid_playback() {
    let decoder = tagged_av_script(100, ms_to_ticks(100), 1102);
    let harness = Harness::new(decoder, test_config(8), CaptureBackend::paced());
    let mut events = harness.controller.subscribe_events();

    harness.controller.play().unwrap();
    assert!(wait_for(Duration::from_secs(2), || harness.display.count() >= 3));
    assert!(harness.controller.current_buffer_depth() > 0);
    assert!(harness.controller.workers_alive().any());

    harness.controller.stop();

    let alive = harness.controller.workers_alive();
    assert!(!alive.any(), "workers still alive: {:?}", alive);
    assert!(!harness.controller.is_playing());
    assert_eq!(harness.controller.playback_state(), PlaybackState::Stopped);

    let pool = harness.controller.pool_stats();
    assert_eq!(pool.free, pool.capacity);
    assert_eq!(pool.bound, 0);
    assert_eq!(harness.controller.position_ticks(), 0, "stop rewinds");

    // Idempotent
    harness.controller.stop();
    harness.controller.stop();

    let events = drain_events(&mut events);
    let stopped = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::PlaybackStopped { kept_audio: false, .. }))
        .count();
    assert_eq!(stopped, 1);
}

/// Scenario D: seek while running restarts cleanly with no stale audio
#[test]
#[serial]
fn test_scenario_d_seek_discards_stale_audio() {
    const FRAMES: usize = 60;
    let interval = ms_to_ticks(100);
    let decoder = tagged_av_script(FRAMES, interval, 1102);
    let harness = Harness::new(decoder, test_config(10), CaptureBackend::paced());
    let mut events = harness.controller.subscribe_events();

    harness.controller.play().unwrap();
    assert!(wait_for(Duration::from_secs(2), || harness.display.count() >= 3));

    let target_frame = 40;
    harness.controller.seek(target_frame as i64 * interval).unwrap();
    let seek_returned = Instant::now();
    assert!(harness.controller.is_playing(), "playback restarted");

    assert!(wait_for(Duration::from_secs(2), || {
        harness.backend.writes().iter().any(|w| w.at > seek_returned)
    }));
    harness.controller.stop();

    // Audio bytes carry their frame index + 1
    let min_value = target_frame as u8 + 1;
    for write in harness.backend.writes().iter().filter(|w| w.at > seek_returned) {
        assert!(
            write.data.iter().all(|&b| b >= min_value),
            "stale audio after seek: {:?}",
            &write.data[..write.data.len().min(8)]
        );
    }

    // Video runs from the start, then continues from the seek target
    let order: Vec<u8> = harness.display.pictures().iter().map(|p| p.data[0]).collect();
    let restart = order
        .iter()
        .position(|&v| v == target_frame as u8)
        .expect("seek target presented");
    assert!(restart >= 3);
    assert!(order[..restart].windows(2).all(|w| w[1] == w[0] + 1));
    assert!(order[restart..].windows(2).all(|w| w[1] == w[0] + 1));

    // Same device across the seek
    assert_eq!(harness.backend.open_count(), 1);

    let events = drain_events(&mut events);
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            EngineEvent::PlaybackStarted { .. } => "started",
            EngineEvent::PlaybackStopped { kept_audio: true, .. } => "stopped-kept",
            EngineEvent::PlaybackStopped { .. } => "stopped",
            EngineEvent::Seeked { .. } => "seeked",
            _ => "other",
        })
        .filter(|k| *k != "other")
        .collect();
    assert_eq!(kinds, vec!["started", "seeked", "started", "stopped"]);
}

#[test]
#[serial]
fn test_natural_end_reports_finished() {
    let stream = framesync_player::media::SyntheticStream {
        duration_ms: 600,
        fps: 20,
        ..Default::default()
    };
    let mut config = test_config(16);
    config.cache.unit_size = stream.max_payload();
    let harness = Harness::new(stream.build(), config, CaptureBackend::instant());
    let mut events = harness.controller.subscribe_events();

    harness.controller.play().unwrap();
    assert!(harness.controller.wait_until_idle(Duration::from_secs(5)));
    assert!(harness.controller.wait_for_audio_drain(Duration::from_secs(2)));

    let stats = harness.controller.scheduler_stats();
    assert_eq!(stats.video_frames, 12);
    assert_eq!(stats.audio_frames, 12);
    assert!(harness.backend.total_bytes() > 0);
    assert!(harness.controller.last_error().is_none());

    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::PlaybackFinished { frames_dispatched, .. } if *frames_dispatched == stats.total_frames()
    )));

    // Playing again after the end starts over
    harness.controller.play().unwrap();
    assert!(harness.controller.wait_until_idle(Duration::from_secs(5)));
    assert_eq!(harness.display.count(), 24);
}

#[test]
fn test_device_unavailable_aborts_play() {
    let decoder = tagged_av_script(10, ms_to_ticks(100), 256);
    let harness = Harness::new(decoder, test_config(4), CaptureBackend::unavailable("no device"));
    let mut events = harness.controller.subscribe_events();

    let result = harness.controller.play();
    assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    assert!(!harness.controller.is_playing());
    assert!(!harness.controller.workers_alive().any());
    assert_eq!(harness.display.count(), 0);
    assert!(harness.controller.last_error().unwrap().contains("no device"));

    let events = drain_events(&mut events);
    assert!(matches!(events.as_slice(), [EngineEvent::AudioDeviceFault { .. }]));

    // Decoder was kept: a retry fails the same way instead of losing it
    assert!(matches!(harness.controller.play(), Err(Error::DeviceUnavailable(_))));
}

#[test]
fn test_decoder_fault_ends_session() {
    let ticks: Vec<i64> = (0..10).map(|i| ms_to_ticks(i * 10)).collect();
    let decoder = video_script(&ticks).failing_at(5);
    let harness = Harness::new(decoder, test_config(4), CaptureBackend::instant());
    let mut events = harness.controller.subscribe_events();

    harness.controller.play().unwrap();
    assert!(harness.controller.wait_until_idle(Duration::from_secs(5)));

    assert_eq!(harness.display.count(), 5, "frames queued before the fault still play");
    assert!(harness.controller.last_error().unwrap().contains("corrupt"));

    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| matches!(e, EngineEvent::DecoderFault { .. })));
    assert!(!events.iter().any(|e| matches!(e, EngineEvent::PlaybackFinished { .. })));

    harness.controller.stop();
    let pool = harness.controller.pool_stats();
    assert_eq!(pool.free, pool.capacity);
}

#[test]
#[serial]
fn test_stop_keeping_audio_then_resume() {
    let interval = ms_to_ticks(50);
    let decoder = tagged_av_script(100, interval, 551);
    let harness = Harness::new(decoder, test_config(6), CaptureBackend::paced());

    harness.controller.play().unwrap();
    assert!(wait_for(Duration::from_secs(2), || harness.display.count() >= 4));
    harness.controller.stop_keeping_audio();

    let alive = harness.controller.workers_alive();
    assert!(!alive.cache && !alive.scheduler);
    assert!(alive.audio, "audio sink kept open");
    let paused_at = harness.controller.position_ticks();
    let presented = harness.display.count();

    harness.controller.play().unwrap();
    assert!(wait_for(Duration::from_secs(2), || harness.display.count() > presented));
    let resumed = &harness.display.pictures()[presented];
    assert_eq!(resumed.data[0] as i64, paused_at / interval + 1, "continues after last frame");
    assert_eq!(harness.backend.open_count(), 1, "device not reopened");

    harness.controller.stop();
    assert!(!harness.controller.workers_alive().any());
}

#[test]
fn test_seek_while_stopped_positions_next_play() {
    let interval = ms_to_ticks(20);
    let ticks: Vec<i64> = (0..20).map(|i| i * interval).collect();
    let harness = Harness::new(video_script(&ticks), test_config(4), CaptureBackend::instant());

    harness.controller.seek(15 * interval).unwrap();
    assert!(!harness.controller.is_playing());
    assert_eq!(harness.controller.position_ticks(), 15 * interval);

    harness.controller.play().unwrap();
    assert!(harness.controller.wait_until_idle(Duration::from_secs(5)));
    let order: Vec<u8> = harness.display.pictures().iter().map(|p| p.data[0]).collect();
    assert_eq!(order, vec![15, 16, 17, 18, 19]);

    // Out-of-range targets clamp to the stream
    harness.controller.seek(-100).unwrap();
    assert_eq!(harness.controller.position_ticks(), 0);
    harness.controller.seek(i64::MAX).unwrap();
    assert_eq!(harness.controller.position_ticks(), 19 * interval);
}

#[test]
fn test_play_is_idempotent_while_running() {
    let ticks: Vec<i64> = (0..3).map(|i| ms_to_ticks(i * 200)).collect();
    let harness = Harness::new(video_script(&ticks), test_config(2), CaptureBackend::instant());
    let mut events = harness.controller.subscribe_events();

    harness.controller.play().unwrap();
    harness.controller.play().unwrap();
    assert!(harness.controller.is_playing());
    harness.controller.stop();

    let started = drain_events(&mut events)
        .iter()
        .filter(|e| matches!(e, EngineEvent::PlaybackStarted { .. }))
        .count();
    assert_eq!(started, 1);
}

#[test]
#[serial]
fn test_drop_stops_every_worker() {
    let decoder = tagged_av_script(100, ms_to_ticks(100), 1102);
    let Harness {
        controller,
        display,
        backend,
        ..
    } = Harness::new(decoder, test_config(4), CaptureBackend::paced());

    controller.play().unwrap();
    assert!(wait_for(Duration::from_secs(2), || display.count() >= 2));
    drop(controller);

    let writes = backend.writes().len();
    let presented = display.count();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(backend.writes().len(), writes, "audio thread still writing");
    assert_eq!(display.count(), presented, "scheduler still presenting");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_commands_from_async_task() {
    let interval = ms_to_ticks(20);
    let harness = Harness::new(
        tagged_av_script(10, interval, 220),
        test_config(4),
        CaptureBackend::instant(),
    );

    harness.controller.play().unwrap();
    assert!(harness.controller.is_playing());
    harness.controller.seek(5 * interval).unwrap();
    assert!(harness.controller.wait_until_idle(Duration::from_secs(5)));
    harness.controller.stop();

    assert!(harness.backend.total_bytes() > 0);
    assert!(harness.controller.last_error().is_none());
    assert!(!harness.controller.workers_alive().any());
}
