mod common;

use common::*;
use smedia_player::core::{ChannelLayout, PlayerPhase};
use smedia_player::player::PlayerEvent;
use smedia_player::PlayerConfig;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

fn is_completed(event: &PlayerEvent) -> bool {
    matches!(event, PlayerEvent::Completed)
}

#[test]
fn audio_only_source_plays_to_completion() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    h.player
        .prepare_with_source(Box::new(FakeSource::new(2, false)))
        .unwrap();
    assert_eq!(h.player.phase(), PlayerPhase::Prepared);
    assert!(!h.player.has_video());

    h.player.play().unwrap();
    assert_eq!(h.player.phase(), PlayerPhase::Playing);

    let (mut events, completed) = collect_until(&h.events, Duration::from_secs(10), is_completed);
    assert!(completed, "未收到 completed: {:?}", events);
    thread::sleep(Duration::from_millis(200));
    events.extend(h.events.try_iter());

    assert_eq!(events[0], PlayerEvent::Prepared { duration: 2 });
    assert_eq!(h.player.phase(), PlayerPhase::Completed);
    assert_eq!(progress_values(&events), vec![0, 1]);
    assert!(events.contains(&PlayerEvent::Progress { current: 1, total: 2 }));
    // 采样全部为 1000 → 60 dB
    assert!(events.contains(&PlayerEvent::VolumeDb { db: 60 }));
    assert!(events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Loading { .. })));
    assert_eq!(
        h.written.load(Ordering::SeqCst),
        20 * SAMPLES_PER_PACKET * 2
    );

    h.player.stop();
    assert_eq!(h.player.phase(), PlayerPhase::Stopped);
    assert!(h.events.try_iter().any(|e| e == PlayerEvent::Stopped));
}

#[test]
fn video_frames_are_rendered_in_order() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    h.player
        .prepare_with_source(Box::new(FakeSource::new(2, true)))
        .unwrap();
    assert!(h.player.has_video());
    h.player.play().unwrap();

    let mut frames = 0;
    let (events, _) = collect_until(&h.events, Duration::from_secs(15), |e| {
        if matches!(e, PlayerEvent::RenderYuv { .. }) {
            frames += 1;
        }
        frames == 40
    });
    assert_eq!(frames, 40);

    let pts: Vec<i64> = events
        .iter()
        .filter_map(|e| match e {
            PlayerEvent::RenderYuv { width, height, pts } => {
                assert_eq!((*width, *height), (4, 4));
                *pts
            }
            _ => None,
        })
        .collect();
    assert!(pts.windows(2).all(|w| w[0] <= w[1]), "{:?}", pts);

    h.player.stop();
}

#[test]
fn pause_stops_output_and_resume_continues() {
    let mut h = harness(PlayerConfig::default(), Duration::from_millis(20));
    h.player
        .prepare_with_source(Box::new(FakeSource::new(10, false)))
        .unwrap();
    h.player.play().unwrap();

    let (_, reached) = collect_until(&h.events, Duration::from_secs(10), |e| {
        matches!(e, PlayerEvent::Progress { current: 1, .. })
    });
    assert!(reached);

    h.player.pause();
    assert_eq!(h.player.phase(), PlayerPhase::Paused);
    // 重复 pause 不产生通知
    h.player.pause();

    thread::sleep(Duration::from_millis(150));
    let before = h.written.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(h.written.load(Ordering::SeqCst), before);

    let paused_events: Vec<_> = h.events.try_iter().collect();
    assert_eq!(
        paused_events
            .iter()
            .filter(|e| **e == PlayerEvent::Paused)
            .count(),
        1
    );

    h.player.resume();
    assert_eq!(h.player.phase(), PlayerPhase::Playing);

    let (events, completed) = collect_until(&h.events, Duration::from_secs(20), is_completed);
    assert!(completed);
    assert!(events.contains(&PlayerEvent::Resumed));
    assert!(h.written.load(Ordering::SeqCst) > before);

    let progress = progress_values(&events);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);

    h.player.stop();
}

#[test]
fn seek_clears_queues_and_resets_clock() {
    let config = PlayerConfig {
        queue_capacity: 1000,
        ..PlayerConfig::default()
    };
    let mut h = harness(config, Duration::from_millis(20));
    let source = FakeSource::new(10, true);
    let seeks = source.seeks.clone();
    h.player.prepare_with_source(Box::new(source)).unwrap();
    h.player.play().unwrap();

    let (_, reached) = collect_until(&h.events, Duration::from_secs(10), |e| {
        matches!(e, PlayerEvent::Progress { current: 1, .. })
    });
    assert!(reached);

    h.player.pause();
    thread::sleep(Duration::from_millis(200));
    h.events.try_iter().for_each(drop);

    h.player.seek(5.0);
    assert_eq!(h.player.queue_sizes(), (0, 0));
    assert_eq!(h.player.current_position(), 0.0);
    assert_eq!(*seeks.lock(), vec![5_000_000]);

    h.player.resume();
    let (events, completed) = collect_until(&h.events, Duration::from_secs(20), is_completed);
    assert!(completed);

    let progress = progress_values(&events);
    assert_eq!(progress.first(), Some(&5), "{:?}", progress);
    assert!(progress.iter().all(|p| *p >= 5), "{:?}", progress);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);

    h.player.stop();
}

#[test]
fn out_of_range_seek_is_ignored() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    let source = FakeSource::new(3, false);
    let seeks = source.seeks.clone();
    h.player.prepare_with_source(Box::new(source)).unwrap();

    h.player.seek(-0.5);
    h.player.seek(3.0);
    h.player.seek(f64::NAN);
    assert!(seeks.lock().is_empty());

    h.player.seek(0.0);
    assert_eq!(*seeks.lock(), vec![0]);
}

#[test]
fn seek_range_uses_whole_seconds() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    let source = FakeSource::new(4, false).with_duration(3.5);
    let seeks = source.seeks.clone();
    h.player.prepare_with_source(Box::new(source)).unwrap();

    h.player.seek(3.2);
    assert!(seeks.lock().is_empty());

    h.player.seek(2.5);
    assert_eq!(*seeks.lock(), vec![2_500_000]);
}

#[test]
fn transient_read_error_is_retried() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    h.player
        .prepare_with_source(Box::new(FakeSource::new(2, false).with_read_error_at(5)))
        .unwrap();
    h.player.play().unwrap();

    let (events, completed) = collect_until(&h.events, Duration::from_secs(10), is_completed);
    assert!(completed, "未收到 completed: {:?}", events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Error { .. })));
    // 出错的包在重试时重新读到，没有丢失
    assert_eq!(
        h.written.load(Ordering::SeqCst),
        20 * SAMPLES_PER_PACKET * 2
    );

    h.player.stop();
}

#[test]
fn decode_errors_skip_one_packet() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    h.player
        .prepare_with_source(Box::new(FakeSource::new(2, true).with_decode_error_at(3)))
        .unwrap();
    h.player.play().unwrap();

    let mut frames = 0;
    let (events, completed) = collect_until(&h.events, Duration::from_secs(15), |e| {
        if matches!(e, PlayerEvent::RenderYuv { .. }) {
            frames += 1;
        }
        is_completed(e)
    });
    assert!(completed, "未收到 completed: {:?}", events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Error { .. })));
    assert_eq!(
        h.written.load(Ordering::SeqCst),
        19 * SAMPLES_PER_PACKET * 2
    );

    // completed 只等音频，视频线程继续把剩下的帧渲染完
    if frames < 39 {
        collect_until(&h.events, Duration::from_secs(10), |e| {
            if matches!(e, PlayerEvent::RenderYuv { .. }) {
                frames += 1;
            }
            frames == 39
        });
    }
    thread::sleep(Duration::from_millis(200));
    frames += h
        .events
        .try_iter()
        .filter(|e| matches!(e, PlayerEvent::RenderYuv { .. }))
        .count();
    assert_eq!(frames, 39);

    h.player.stop();
}

#[test]
fn stop_joins_all_threads_promptly() {
    let mut h = harness(PlayerConfig::default(), Duration::from_millis(20));
    h.player
        .prepare_with_source(Box::new(FakeSource::new(10, true)))
        .unwrap();
    h.player.play().unwrap();

    let (_, reached) = collect_until(&h.events, Duration::from_secs(10), |e| {
        matches!(e, PlayerEvent::Progress { .. })
    });
    assert!(reached);

    let start = Instant::now();
    h.player.stop();
    assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
    assert_eq!(h.player.phase(), PlayerPhase::Stopped);
    assert_eq!(h.player.total_duration(), 0.0);
    assert!(h.events.try_iter().any(|e| e == PlayerEvent::Stopped));

    // 已停止：再次 stop / play 都是空操作
    h.player.stop();
    h.player.play().unwrap();
    assert_eq!(h.player.phase(), PlayerPhase::Stopped);
    assert!(h.events.try_iter().all(|e| e != PlayerEvent::Stopped));
}

#[test]
fn stop_while_paused_does_not_deadlock() {
    let mut h = harness(PlayerConfig::default(), Duration::from_millis(20));
    h.player
        .prepare_with_source(Box::new(FakeSource::new(10, true)))
        .unwrap();
    h.player.play().unwrap();
    thread::sleep(Duration::from_millis(100));
    h.player.pause();
    thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    h.player.stop();
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn missing_audio_stream_is_fatal() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    let result = h
        .player
        .prepare_with_source(Box::new(FakeSource::new(2, true).without_audio()));
    assert!(result.is_err());
    assert_eq!(h.player.phase(), PlayerPhase::Idle);
    assert_eq!(
        h.events.try_iter().collect::<Vec<_>>(),
        vec![PlayerEvent::Error {
            code: -1,
            message: "Cannot find or prepare audio".to_string(),
        }]
    );

    // 失败后可以重新准备
    h.player
        .prepare_with_source(Box::new(FakeSource::new(2, true)))
        .unwrap();
    assert_eq!(h.player.phase(), PlayerPhase::Prepared);
}

#[test]
fn audio_decoder_failure_is_reported() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);
    let result = h
        .player
        .prepare_with_source(Box::new(FakeSource::new(2, false).with_broken_audio_decoder()));
    assert!(result.is_err());
    assert_eq!(h.player.phase(), PlayerPhase::Idle);
    match h.events.try_recv() {
        Ok(PlayerEvent::Error { code, message }) => {
            assert_eq!(code, -1);
            assert!(message.contains("fake"), "{}", message);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn invalid_operations_are_ignored() {
    let mut h = harness(PlayerConfig::default(), Duration::ZERO);

    // 没有会话
    h.player.pause();
    h.player.resume();
    h.player.stop();
    h.player.play().unwrap();
    assert!(h.player.prepare().is_err());
    assert_eq!(h.player.phase(), PlayerPhase::Idle);

    h.player
        .prepare_with_source(Box::new(FakeSource::new(2, false)))
        .unwrap();
    h.events.try_iter().for_each(drop);

    // 尚未播放
    h.player.pause();
    h.player.resume();
    assert_eq!(h.player.phase(), PlayerPhase::Prepared);

    // 会话进行中不能再次 prepare
    assert!(h
        .player
        .prepare_with_source(Box::new(FakeSource::new(2, false)))
        .is_err());
    assert!(h.events.try_iter().next().is_none());
}

#[test]
fn next_replaces_the_session() {
    let mut h = harness(PlayerConfig::default(), Duration::from_millis(20));
    h.player
        .prepare_with_source(Box::new(FakeSource::new(10, false)))
        .unwrap();
    h.player.play().unwrap();

    let missing = "/nonexistent/smedia-player-test.mp4";
    assert!(h.player.next(missing).is_err());
    assert_eq!(h.player.data_source(), Some(missing));
    assert_eq!(h.player.phase(), PlayerPhase::Idle);

    let (events, found) = collect_until(&h.events, Duration::from_secs(5), |e| {
        matches!(e, PlayerEvent::Error { .. })
    });
    assert!(found);
    assert!(events.contains(&PlayerEvent::Stopped));
    match events.last() {
        Some(PlayerEvent::Error { message, .. }) => assert!(
            message.contains("Open data source failed, the data source is: /nonexistent"),
            "{}",
            message
        ),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn controls_survive_without_session() {
    let h = harness(PlayerConfig::default(), Duration::ZERO);
    assert_eq!(h.player.volume(), 50);
    h.player.set_volume(150);
    assert_eq!(h.player.volume(), 50);
    h.player.set_volume(80);
    assert_eq!(h.player.volume(), 80);

    assert_eq!(h.player.channel_layout(), ChannelLayout::Stereo);
    h.player.set_channel_layout(ChannelLayout::Left);
    assert_eq!(h.player.channel_layout(), ChannelLayout::Left);

    h.player.set_pitch(0.0);
    assert_eq!(h.player.pitch(), 1.0);
    h.player.set_tempo(1.5);
    assert_eq!(h.player.tempo(), 1.5);
}
