use crate::core::{ChannelLayout, PlayerError, Result, TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::ArrayQueue;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 音量 / 声道控制，由控制线程写、输出回调读
#[derive(Debug)]
pub struct OutputControls {
    volume: AtomicU8,
    channel_layout: AtomicU8,
}

impl OutputControls {
    pub fn new(volume: u8) -> Self {
        Self {
            volume: AtomicU8::new(volume.min(100)),
            channel_layout: AtomicU8::new(ChannelLayout::Stereo.code()),
        }
    }

    /// 音量百分比 [0, 100]
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Acquire)
    }

    /// 设置音量，超出 [0, 100] 的值被忽略
    pub fn set_volume(&self, percent: i32) -> bool {
        if !(0..=100).contains(&percent) {
            warn!("忽略非法音量: {}", percent);
            return false;
        }
        self.volume.store(percent as u8, Ordering::Release);
        true
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        ChannelLayout::from_code(self.channel_layout.load(Ordering::Acquire))
    }

    pub fn set_channel_layout(&self, layout: ChannelLayout) {
        self.channel_layout.store(layout.code(), Ordering::Release);
    }

    /// 当前音量对应的线性增益
    pub fn gain(&self) -> f32 {
        millibel_to_gain(volume_curve(self.volume()))
    }
}

impl Default for OutputControls {
    fn default() -> Self {
        Self::new(50)
    }
}

/// 音量百分比 → 输出电平（毫贝），低音量段斜率更陡
pub fn volume_curve(percent: u8) -> i32 {
    let p = percent.min(100) as i32;
    let slope = match p {
        p if p > 30 => -20,
        p if p > 25 => -22,
        p if p > 20 => -25,
        p if p > 15 => -28,
        p if p > 10 => -30,
        p if p > 5 => -34,
        p if p > 3 => -37,
        p if p > 0 => -40,
        _ => -100,
    };
    (100 - p) * slope
}

/// 毫贝 → 线性增益
pub fn millibel_to_gain(millibel: i32) -> f32 {
    10f32.powf(millibel as f32 / 2000.0)
}

/// 单个采样点应用增益和声道静音，输出 [-1, 1] 的浮点值
pub fn mix_sample(sample: i16, channel: usize, gain: f32, layout: ChannelLayout) -> f32 {
    if layout.is_muted(channel) {
        return 0.0;
    }
    (sample as f32 / i16::MAX as f32 * gain).clamp(-1.0, 1.0)
}

/// 音频输出接口
///
/// 数据为交错的 s16 立体声 44100Hz。write 在缓冲区满时最多等待 `timeout`，
/// 返回实际写入的采样个数（可能为 0，调用方重试即可）。
pub trait AudioSink: Send {
    fn open(&mut self) -> Result<()>;

    fn write(&mut self, pcm: &[i16], timeout: Duration) -> usize;

    fn pause(&mut self);

    fn resume(&mut self);

    /// 丢弃尚未播放的数据（seek 后调用）
    fn clear(&mut self);

    fn close(&mut self);
}

/// 约 250ms 的环形缓冲
const RING_CAPACITY: usize = (TARGET_SAMPLE_RATE as usize / 4) * TARGET_CHANNELS as usize;

/// 基于 cpal 的音频输出
pub struct CpalAudioSink {
    controls: Arc<OutputControls>,
    ring: Arc<ArrayQueue<i16>>,
    paused: Arc<AtomicBool>,
    stream: Option<Stream>,
}

// cpal::Stream 本身不是 Send，但它只会在音频线程中创建、使用和销毁
unsafe impl Send for CpalAudioSink {}

impl CpalAudioSink {
    pub fn new(controls: Arc<OutputControls>) -> Self {
        Self {
            controls,
            ring: Arc::new(ArrayQueue::new(RING_CAPACITY)),
            paused: Arc::new(AtomicBool::new(false)),
            stream: None,
        }
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        rate_in_range && config.channels == supported.channels()
    }
}

impl AudioSink for CpalAudioSink {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        info!("初始化音频输出: {} Hz, {} 声道", TARGET_SAMPLE_RATE, TARGET_CHANNELS);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;
        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let config = StreamConfig {
            channels: TARGET_CHANNELS,
            sample_rate: cpal::SampleRate(TARGET_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let supported = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
            .any(|range| Self::is_config_compatible(&config, &range));
        if !supported {
            return Err(PlayerError::AudioError(format!(
                "音频设备不支持 {} Hz, {} 声道",
                TARGET_SAMPLE_RATE, TARGET_CHANNELS
            )));
        }

        let ring = self.ring.clone();
        let paused = self.paused.clone();
        let controls = self.controls.clone();
        let channels = TARGET_CHANNELS as usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let gain = controls.gain();
                    let layout = controls.channel_layout();
                    let is_paused = paused.load(Ordering::Acquire);
                    // 按整帧取数据，避免左右声道错位
                    for frame in data.chunks_mut(channels) {
                        if is_paused || ring.len() < channels {
                            frame.iter_mut().for_each(|s| *s = 0.0);
                            continue;
                        }
                        for (channel, out) in frame.iter_mut().enumerate() {
                            let sample = ring.pop().unwrap_or(0);
                            *out = mix_sample(sample, channel, gain, layout);
                        }
                    }
                },
                move |err| {
                    warn!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.paused.store(false, Ordering::Release);
        self.stream = Some(stream);
        info!("音频输出已启动");
        Ok(())
    }

    fn write(&mut self, pcm: &[i16], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut written = 0;
        while written < pcm.len() {
            match self.ring.push(pcm[written]) {
                Ok(()) => written += 1,
                Err(_) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
        written
    }

    fn pause(&mut self) {
        self.paused.store(true, Ordering::Release);
        if let Some(stream) = self.stream.as_ref() {
            if let Err(e) = stream.pause() {
                debug!("暂停音频流失败（回调已静音）: {}", e);
            }
        }
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Release);
        if let Some(stream) = self.stream.as_ref() {
            if let Err(e) = stream.play() {
                warn!("恢复音频流失败: {}", e);
            }
        }
    }

    fn clear(&mut self) {
        while self.ring.pop().is_some() {}
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
        self.clear();
    }
}

impl Drop for CpalAudioSink {
    fn drop(&mut self) {
        self.close();
    }
}
