#![allow(dead_code)]

use crossbeam_channel::Receiver;
use ffmpeg_next::Packet;
use parking_lot::Mutex;
use smedia_player::core::{MediaInfo, PcmFrame, Result, StreamInfo, YuvFrame, PlayerError};
use smedia_player::player::{
    AudioDecode, AudioSink, Backends, ChannelListener, DemuxerSource, MediaPlayer, OutputControls,
    PlayerEvent, ReadOutcome, StretchParams, TimeStretch, VideoDecode,
};
use smedia_player::PlayerConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const AUDIO_INDEX: usize = 0;
pub const VIDEO_INDEX: usize = 1;
pub const DATA_INDEX: usize = 2;

/// 每个音频包 100ms
pub const AUDIO_PACKET_MS: i64 = 100;
pub const SAMPLES_PER_PACKET: usize = 4410;

/// 内存中的数据源：按 pts 交错的音频 / 视频 / 数据包，时间基均为 1/1000
pub struct FakeSource {
    packets: Vec<(usize, i64)>,
    cursor: usize,
    info: MediaInfo,
    pub seeks: Arc<Mutex<Vec<i64>>>,
    fail_audio_decoder: bool,
    /// 读到第 N 个包时返回一次错误（不前进游标）
    fail_read_at: Option<usize>,
    /// 解码器第 N 次调用时返回一次错误
    fail_decode_at: Option<usize>,
}

impl FakeSource {
    pub fn new(duration_secs: i64, with_video: bool) -> Self {
        let duration_ms = duration_secs * 1000;
        let mut packets = Vec::new();
        let mut t = 0;
        while t < duration_ms {
            packets.push((AUDIO_INDEX, t));
            if with_video {
                packets.push((VIDEO_INDEX, t));
                packets.push((VIDEO_INDEX, t + 40));
            }
            if t % 1000 == 0 {
                packets.push((DATA_INDEX, t));
            }
            t += AUDIO_PACKET_MS;
        }

        let time_base = 1.0 / 1000.0;
        Self {
            packets,
            cursor: 0,
            info: MediaInfo {
                duration: duration_secs as f64,
                audio: Some(StreamInfo {
                    index: AUDIO_INDEX,
                    time_base,
                    frame_rate: (0, 0),
                }),
                video: with_video.then_some(StreamInfo {
                    index: VIDEO_INDEX,
                    time_base,
                    frame_rate: (25, 1),
                }),
            },
            seeks: Arc::new(Mutex::new(Vec::new())),
            fail_audio_decoder: false,
            fail_read_at: None,
            fail_decode_at: None,
        }
    }

    pub fn without_audio(mut self) -> Self {
        self.info.audio = None;
        self
    }

    pub fn with_broken_audio_decoder(mut self) -> Self {
        self.fail_audio_decoder = true;
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.info.duration = seconds;
        self
    }

    pub fn with_read_error_at(mut self, packet: usize) -> Self {
        self.fail_read_at = Some(packet);
        self
    }

    pub fn with_decode_error_at(mut self, call: usize) -> Self {
        self.fail_decode_at = Some(call);
        self
    }
}

impl DemuxerSource for FakeSource {
    fn read_packet(&mut self) -> Result<ReadOutcome> {
        if self.fail_read_at == Some(self.cursor) {
            self.fail_read_at = None;
            return Err(PlayerError::Other("fake read error".to_string()));
        }
        let Some(&(stream, pts)) = self.packets.get(self.cursor) else {
            return Ok(ReadOutcome::EndOfStream);
        };
        self.cursor += 1;
        let mut packet = Packet::copy(&[0u8; 16]);
        packet.set_stream(stream);
        packet.set_pts(Some(pts));
        Ok(ReadOutcome::Packet(packet))
    }

    fn seek(&mut self, timestamp_us: i64) -> Result<()> {
        self.seeks.lock().push(timestamp_us);
        let target_ms = timestamp_us / 1000;
        self.cursor = self
            .packets
            .iter()
            .position(|&(_, pts)| pts >= target_ms)
            .unwrap_or(self.packets.len());
        Ok(())
    }

    fn media_info(&self) -> &MediaInfo {
        &self.info
    }

    fn open_audio_decoder(&self) -> Result<Box<dyn AudioDecode>> {
        if self.fail_audio_decoder {
            return Err(PlayerError::CodecNotFound("fake".to_string()));
        }
        Ok(Box::new(FakeAudioDecoder {
            fail_at: self.fail_decode_at,
            ..FakeAudioDecoder::default()
        }))
    }

    fn open_video_decoder(&self) -> Result<Box<dyn VideoDecode>> {
        Ok(Box::new(FakeVideoDecoder {
            calls: 0,
            fail_at: self.fail_decode_at,
        }))
    }

    fn description(&self) -> String {
        format!("fake source ({} packets)", self.packets.len())
    }
}

#[derive(Default)]
pub struct FakeAudioDecoder {
    pub flushes: usize,
    calls: usize,
    fail_at: Option<usize>,
}

impl AudioDecode for FakeAudioDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<PcmFrame>> {
        self.calls += 1;
        if self.fail_at == Some(self.calls) {
            return Err(PlayerError::DecodeError("fake audio decode error".to_string()));
        }
        Ok(vec![PcmFrame {
            pts: packet.pts(),
            nb_samples: SAMPLES_PER_PACKET,
            samples: vec![1000; SAMPLES_PER_PACKET * 2],
        }])
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}

pub struct FakeVideoDecoder {
    calls: usize,
    fail_at: Option<usize>,
}

impl VideoDecode for FakeVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<YuvFrame>> {
        self.calls += 1;
        if self.fail_at == Some(self.calls) {
            return Err(PlayerError::DecodeError("fake video decode error".to_string()));
        }
        Ok(vec![YuvFrame {
            pts: packet.pts(),
            width: 4,
            height: 4,
            y: vec![16; 16],
            u: vec![128; 4],
            v: vec![128; 4],
        }])
    }

    fn flush(&mut self) {}
}

/// 原样输出的变速变调
#[derive(Default)]
pub struct PassthroughStretch {
    ready: VecDeque<i16>,
}

impl TimeStretch for PassthroughStretch {
    fn put_samples(&mut self, samples: &[i16], nb_samples: usize) -> Result<()> {
        self.ready.extend(&samples[..(nb_samples * 2).min(samples.len())]);
        Ok(())
    }

    fn receive_samples(&mut self, out: &mut Vec<i16>, max_samples: usize) -> usize {
        let take = (self.ready.len() / 2).min(max_samples);
        out.extend(self.ready.drain(..take * 2));
        take
    }

    fn clear(&mut self) {
        self.ready.clear();
    }
}

/// 记录写入量的音频输出，每次写入休眠 `pace` 模拟设备消耗
pub struct CountingSink {
    written: Arc<AtomicUsize>,
    pace: Duration,
}

impl AudioSink for CountingSink {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, pcm: &[i16], _timeout: Duration) -> usize {
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
        self.written.fetch_add(pcm.len(), Ordering::SeqCst);
        pcm.len()
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn clear(&mut self) {}

    fn close(&mut self) {}
}

pub struct Harness {
    pub player: MediaPlayer,
    pub events: Receiver<PlayerEvent>,
    pub written: Arc<AtomicUsize>,
}

pub fn harness(config: PlayerConfig, pace: Duration) -> Harness {
    let written = Arc::new(AtomicUsize::new(0));
    let sink_written = written.clone();
    let backends = Backends {
        audio_sink: Arc::new(move |_controls: Arc<OutputControls>| {
            Box::new(CountingSink {
                written: sink_written.clone(),
                pace,
            }) as Box<dyn AudioSink>
        }),
        time_stretch: Arc::new(|_params: Arc<StretchParams>| {
            Ok(Box::new(PassthroughStretch::default()) as Box<dyn TimeStretch>)
        }),
    };
    let (listener, events) = ChannelListener::unbounded();
    let player = MediaPlayer::with_backends(config, Arc::new(listener), backends).unwrap();
    Harness {
        player,
        events,
        written,
    }
}

/// 收集事件直到满足条件或超时，返回收集到的全部事件
pub fn collect_until(
    events: &Receiver<PlayerEvent>,
    timeout: Duration,
    mut done: impl FnMut(&PlayerEvent) -> bool,
) -> (Vec<PlayerEvent>, bool) {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(remaining) {
            Ok(event) => {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    return (seen, true);
                }
            }
            Err(_) => break,
        }
    }
    (seen, false)
}

pub fn progress_values(events: &[PlayerEvent]) -> Vec<i32> {
    events
        .iter()
        .filter_map(|e| match e {
            PlayerEvent::Progress { current, .. } => Some(*current),
            _ => None,
        })
        .collect()
}
