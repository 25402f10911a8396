//! Player state machine tests
//!
//! Drives a full guild session against mock decoders and a mock voice
//! gateway. Every wait is bounded by `helpers::WAIT`.

mod helpers;

use helpers::*;
use std::sync::atomic::Ordering;
use std::time::Duration;
use voxjuke_player::audio::{BYTES_PER_SECOND, CHUNK_SIZE};
use voxjuke_player::playback::{CommandStatus, LoopOutcome, PlaybackState};
use voxjuke_common::events::PlayerEvent;

async fn queue_ids(h: &Harness) -> Vec<String> {
    h.session
        .queue()
        .snapshot()
        .await
        .into_iter()
        .map(|info| info.track.media_id)
        .collect()
}

async fn current_id(h: &Harness) -> Option<String> {
    h.player()
        .now_playing()
        .await
        .entry
        .map(|info| info.track.media_id)
}

async fn start_playing(h: &Harness, query: &str) {
    let (status, _) = h
        .session
        .play(CHANNEL, Some(query), Some("tester".to_string()))
        .await
        .unwrap();
    assert_eq!(status, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;
}

#[tokio::test]
async fn test_play_from_idle_streams_bytes() {
    let h = Harness::new().await;
    h.session.queue().enqueue(entry("rick")).await;

    let mut states = h.player().subscribe_state();
    assert_eq!(*states.borrow_and_update(), PlaybackState::Idle);

    let status = h.player().play(None, CHANNEL).await;
    assert_eq!(status, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;

    wait_until("sink received audio", || async { h.stats().bytes() > 0 }).await;
    assert_eq!(current_id(&h).await.as_deref(), Some("rick"));
    assert_eq!(h.gateway.joins(), 1);
}

#[tokio::test]
async fn test_play_while_playing_enqueues() {
    let h = Harness::new().await;
    start_playing(&h, "y").await;
    h.session.queue().enqueue(entry("w")).await;

    let (status, info) = h.session.play(CHANNEL, Some("x"), None).await.unwrap();
    assert_eq!(status, CommandStatus::Already);
    assert_eq!(info.unwrap().track.media_id, "x");
    assert_eq!(queue_ids(&h).await, vec!["w", "x"]);

    // y keeps playing
    let before = h.stats().bytes();
    wait_until("y still streaming", || async { h.stats().bytes() > before }).await;
    assert_eq!(current_id(&h).await.as_deref(), Some("y"));
    assert_eq!(h.player().state(), PlaybackState::Playing);
}

#[tokio::test]
async fn test_play_with_empty_queue() {
    let h = Harness::new().await;
    assert_eq!(h.player().play(None, CHANNEL).await, CommandStatus::EmptyQueue);
    assert_eq!(h.player().state(), PlaybackState::Idle);
    assert_eq!(h.gateway.joins(), 0);
}

#[tokio::test]
async fn test_failed_lookup_leaves_state() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;

    let result = h.session.play(CHANNEL, Some("missing-song"), None).await;
    assert!(matches!(result, Err(voxjuke_player::Error::NotFound(_))));
    assert!(queue_ids(&h).await.is_empty());
    assert_eq!(h.player().state(), PlaybackState::Playing);
}

#[tokio::test]
async fn test_pause_transitions() {
    let h = Harness::new().await;
    assert_eq!(h.player().pause().await, CommandStatus::EmptyQueue);

    start_playing(&h, "a").await;
    assert_eq!(h.player().pause().await, CommandStatus::Ok);
    assert_eq!(h.player().state(), PlaybackState::Paused);
    assert_eq!(h.player().pause().await, CommandStatus::Already);
}

#[tokio::test]
async fn test_pause_stops_sink_writes() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;
    wait_until("audio flowing", || async { h.stats().bytes() > 0 }).await;

    h.player().pause().await;
    let paused_at = h.stats().bytes();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.stats().bytes(), paused_at);
    assert_eq!(h.stats().open(), 0);
}

#[tokio::test]
async fn test_pause_resume_keeps_entry() {
    let h = Harness::new().await;
    start_playing(&h, "x").await;
    h.session.queue().enqueue(entry("next")).await;
    wait_until("some progress", || async { h.stats().bytes() > CHUNK_SIZE as u64 * 10 }).await;

    h.player().pause().await;
    let paused_progress = h.player().progress().await;
    assert!(paused_progress >= 0);
    let spawns = h.transcoder.spawns_of("x").len();

    assert_eq!(h.player().resume(None).await, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;

    assert_eq!(current_id(&h).await.as_deref(), Some("x"));
    assert_eq!(queue_ids(&h).await, vec!["next"]);
    // Same decoder continues: no new spawn for x, progress carried over
    assert_eq!(h.transcoder.spawns_of("x").len(), spawns);
    assert!(h.player().progress().await >= paused_progress);
}

#[tokio::test]
async fn test_resume_when_playing_is_already() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;
    assert_eq!(h.player().resume(None).await, CommandStatus::Already);
}

#[tokio::test]
async fn test_resume_without_connection() {
    let h = Harness::new().await;
    h.session.queue().enqueue(entry("a")).await;
    assert_eq!(h.player().resume(None).await, CommandStatus::Disconnected);
}

#[tokio::test]
async fn test_join_failure_reports_disconnected() {
    let h = Harness::new().await;
    h.gateway.fail_joins.store(true, Ordering::SeqCst);
    h.session.queue().enqueue(entry("a")).await;

    assert_eq!(h.player().play(None, CHANNEL).await, CommandStatus::Disconnected);
    assert_eq!(h.player().state(), PlaybackState::Idle);
    assert_eq!(queue_ids(&h).await, vec!["a"]);
}

#[tokio::test]
async fn test_skip_last_entry_goes_idle() {
    let h = Harness::new().await;
    start_playing(&h, "only").await;

    assert_eq!(h.player().skip().await, CommandStatus::EmptyQueue);
    assert_eq!(h.player().state(), PlaybackState::Idle);
    assert_eq!(h.player().progress().await, -1);

    wait_until("decoder terminated", || async { h.transcoder.live() == 0 }).await;
}

#[tokio::test]
async fn test_skip_plays_next() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;
    h.session.queue().enqueue(entry("b")).await;

    assert_eq!(h.player().skip().await, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;
    wait_until("b is current", || async { current_id(&h).await.as_deref() == Some("b") }).await;
    assert!(queue_ids(&h).await.is_empty());
}

#[tokio::test]
async fn test_skip_when_disconnected_holds_next() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;
    h.session.queue().enqueue(entry("b")).await;
    h.session.connection().disconnect().await;

    assert_eq!(h.player().skip().await, CommandStatus::Disconnected);
    assert_eq!(h.player().state(), PlaybackState::Paused);
    assert_eq!(current_id(&h).await.as_deref(), Some("b"));

    // Resuming in a channel picks up the held entry
    assert_eq!(h.player().resume(Some(CHANNEL)).await, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;
    assert_eq!(current_id(&h).await.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_seek_near_end_is_out_of_range() {
    let h = Harness::new().await;
    start_playing(&h, "song@200").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let spawns = h.transcoder.spawn_count();

    assert_eq!(
        h.player().seek(Duration::from_secs(171)).await,
        CommandStatus::OutOfRange
    );
    assert_eq!(h.player().state(), PlaybackState::Playing);
    assert_eq!(current_id(&h).await.as_deref(), Some("song"));
    assert_eq!(h.transcoder.spawn_count(), spawns);
}

#[tokio::test]
async fn test_seek_live_stream_is_invalid() {
    let h = Harness::new().await;
    start_playing(&h, "live-radio").await;
    assert_eq!(
        h.player().seek(Duration::from_secs(10)).await,
        CommandStatus::InvalidArgument
    );
}

#[tokio::test]
async fn test_seek_when_not_playing() {
    let h = Harness::new().await;
    assert_eq!(
        h.player().seek(Duration::from_secs(10)).await,
        CommandStatus::NotCurrentlyPlaying
    );

    start_playing(&h, "a").await;
    h.player().pause().await;
    assert_eq!(
        h.player().seek(Duration::from_secs(10)).await,
        CommandStatus::NotCurrentlyPlaying
    );
}

#[tokio::test]
async fn test_seek_restarts_decoder_at_offset() {
    let h = Harness::new().await;
    start_playing(&h, "song@300").await;

    let status = h.player().seek(Duration::from_secs(120)).await;
    assert_eq!(status, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;

    assert!(h.player().progress().await >= 120);
    let spawns = h.transcoder.spawns_of("song");
    assert_eq!(spawns.last().unwrap().seek, Duration::from_secs(120));
    wait_until("old decoder released", || async { h.transcoder.live() == 1 }).await;
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let h = Harness::new().await;
    assert_eq!(h.player().progress().await, -1);

    start_playing(&h, "a").await;
    let mut last = h.player().progress().await;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let now = h.player().progress().await;
        assert!(now >= last);
        last = now;
    }

    // 20x real time: a second of audio every 50 ms
    wait_until("one second elapsed", || async { h.player().progress().await >= 1 }).await;
}

#[tokio::test]
async fn test_loop_toggle() {
    let h = Harness::new().await;
    assert_eq!(h.player().toggle_loop().await, LoopOutcome::NothingToLoop);

    start_playing(&h, "a").await;
    h.session.queue().enqueue(entry("b")).await;

    assert_eq!(h.player().toggle_loop().await, LoopOutcome::NowLooping);
    assert!(h.player().now_playing().await.looping);

    // Skipping while looping replays the looped media, not the queue
    assert_eq!(h.player().skip().await, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;
    assert_eq!(current_id(&h).await.as_deref(), Some("a"));
    assert_eq!(queue_ids(&h).await, vec!["b"]);

    assert_eq!(h.player().toggle_loop().await, LoopOutcome::NoLongerLooping);
    assert!(!h.session.queue().is_looping().await);
}

#[tokio::test]
async fn test_loop_replays_finished_entry() {
    let h = Harness::new().await;
    // A few hundred milliseconds per play
    h.transcoder.set_source("short", Source::Finite(CHUNK_SIZE as u64 * 200));
    start_playing(&h, "short").await;
    h.session.queue().enqueue(entry("after")).await;
    assert_eq!(h.player().toggle_loop().await, LoopOutcome::NowLooping);

    wait_until("looped at least twice", || async {
        h.transcoder.spawns_of("short").len() >= 3
    })
    .await;
    assert_eq!(current_id(&h).await.as_deref(), Some("short"));
    assert_eq!(queue_ids(&h).await, vec!["after"]);
}

#[tokio::test]
async fn test_natural_advance_then_idle() {
    let h = Harness::new().await;
    h.transcoder.set_source("a", Source::Finite(CHUNK_SIZE as u64 * 5));
    h.transcoder.set_source("b", Source::Finite(CHUNK_SIZE as u64 * 5));
    let mut rx = h.events.subscribe_events();

    h.session.queue().enqueue(entry("a")).await;
    h.session.queue().enqueue(entry("b")).await;
    assert_eq!(h.player().play(None, CHANNEL).await, CommandStatus::Ok);

    wait_until("queue drained", || async {
        h.player().state() == PlaybackState::Idle && h.stats().bytes() == CHUNK_SIZE as u64 * 10
    })
    .await;
    assert_eq!(h.player().progress().await, -1);

    let mut started = Vec::new();
    let mut finished = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            PlayerEvent::TrackStarted { media_id, .. } => started.push(media_id),
            PlayerEvent::TrackFinished { media_id, .. } => finished.push(media_id),
            _ => {}
        }
    }
    assert_eq!(started, vec!["a", "b"]);
    assert_eq!(finished, vec!["a", "b"]);
}

#[tokio::test]
async fn test_read_failure_advances() {
    let h = Harness::new().await;
    h.transcoder.set_source("broken", Source::FailsAfter(CHUNK_SIZE as u64 * 3));
    h.session.queue().enqueue(entry("broken")).await;
    h.session.queue().enqueue(entry("good")).await;

    h.player().play(None, CHANNEL).await;
    wait_until("good is current", || async {
        current_id(&h).await.as_deref() == Some("good")
    })
    .await;
    assert_eq!(h.player().state(), PlaybackState::Playing);
}

#[tokio::test]
async fn test_write_failure_pauses_without_advancing() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;
    h.session.queue().enqueue(entry("b")).await;

    h.stats().fail_writes.store(true, Ordering::SeqCst);
    wait_for_state(h.player(), PlaybackState::Paused).await;
    assert_eq!(current_id(&h).await.as_deref(), Some("a"));
    assert_eq!(queue_ids(&h).await, vec!["b"]);

    h.stats().fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(h.player().resume(None).await, CommandStatus::Ok);
    wait_for_state(h.player(), PlaybackState::Playing).await;
    assert_eq!(current_id(&h).await.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_unavailable_decoder_is_skipped() {
    let h = Harness::new().await;
    h.transcoder.set_source("dead", Source::Unavailable);
    h.session.queue().enqueue(entry("dead")).await;
    h.session.queue().enqueue(entry("alive")).await;

    assert_eq!(h.player().play(None, CHANNEL).await, CommandStatus::Ok);
    wait_until("alive is current", || async {
        current_id(&h).await.as_deref() == Some("alive")
    })
    .await;
    // Preload plus the one inline retry
    wait_until("dead tried twice", || async { h.transcoder.spawns_of("dead").len() == 2 }).await;
}

#[tokio::test]
async fn test_stop_keeps_queue() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;
    h.session.queue().enqueue(entry("b")).await;
    h.player().toggle_loop().await;

    h.player().stop().await;
    assert_eq!(h.player().state(), PlaybackState::Idle);
    assert_eq!(h.player().progress().await, -1);
    assert!(!h.session.queue().is_looping().await);
    assert_eq!(queue_ids(&h).await, vec!["b"]);
    assert_eq!(h.stats().open(), 0);
}

#[tokio::test]
async fn test_volume_applies_to_new_decoders() {
    let h = Harness::new().await;
    start_playing(&h, "a").await;
    assert_eq!(h.session.volume_percent(), 50);

    assert_eq!(h.session.set_volume_percent(80), 80);
    h.session.queue().enqueue(entry("b")).await;
    h.player().skip().await;
    wait_until("b is current", || async { current_id(&h).await.as_deref() == Some("b") }).await;

    let a = h.transcoder.spawns_of("a");
    assert!((a[0].volume - 0.5).abs() < f32::EPSILON);
    let b = h.transcoder.spawns_of("b");
    assert!((b.last().unwrap().volume - 0.8).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_concurrent_commands_single_writer() {
    let h = Harness::new().await;
    for i in 0..6 {
        h.session.queue().enqueue(entry(&format!("t{}", i))).await;
    }
    h.player().play(None, CHANNEL).await;

    let mut tasks = Vec::new();
    for round in 0..30 {
        let player = h.player().clone();
        tasks.push(tokio::spawn(async move {
            match round % 5 {
                0 => {
                    player.pause().await;
                }
                1 => {
                    player.resume(Some(CHANNEL)).await;
                }
                2 => {
                    player.skip().await;
                }
                3 => {
                    player.seek(Duration::from_secs(5)).await;
                }
                _ => {
                    player.play(None, CHANNEL).await;
                }
            }
        }));
    }
    for task in tasks {
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }

    assert!(h.stats().max_open() <= 1);

    // Settled: the reported state matches what the sink sees
    h.player().pause().await;
    assert_ne!(h.player().state(), PlaybackState::Playing);
    wait_until("no sink open", || async { h.stats().open() == 0 }).await;
}

#[tokio::test]
async fn test_bytes_per_second_drives_progress() {
    let h = Harness::with_transcoder(MockTranscoder::with_tick(Duration::from_micros(100))).await;
    start_playing(&h, "fast").await;
    wait_until("two seconds of audio", || async {
        h.stats().bytes() >= BYTES_PER_SECOND * 2
    })
    .await;
    assert!(h.player().progress().await >= 2);
}
