use crate::core::{PlayerError, Result, TARGET_BYTES_PER_SAMPLE, TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::{filter, util};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// 音调 / 速度参数，可在任意线程随时修改，对之后送入的采样生效
#[derive(Debug)]
pub struct StretchParams {
    pitch: AtomicU32,
    tempo: AtomicU32,
    version: AtomicU64,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            pitch: AtomicU32::new(1.0f32.to_bits()),
            tempo: AtomicU32::new(1.0f32.to_bits()),
            version: AtomicU64::new(0),
        }
    }
}

impl StretchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch.load(Ordering::Acquire))
    }

    pub fn tempo(&self) -> f32 {
        f32::from_bits(self.tempo.load(Ordering::Acquire))
    }

    /// 每次修改递增，用于判断是否需要重建处理链
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// 设置音调（1.0 为原调），非法值被忽略
    pub fn set_pitch(&self, pitch: f32) -> bool {
        if !Self::is_valid(pitch) {
            warn!("忽略非法音调: {}", pitch);
            return false;
        }
        self.pitch.store(pitch.to_bits(), Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// 设置速度（1.0 为原速），非法值被忽略
    pub fn set_tempo(&self, tempo: f32) -> bool {
        if !Self::is_valid(tempo) {
            warn!("忽略非法速度: {}", tempo);
            return false;
        }
        self.tempo.store(tempo.to_bits(), Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn is_valid(value: f32) -> bool {
        value.is_finite() && value > 0.0
    }
}

/// 变速变调处理接口
///
/// 送入 N 个采样点，可取出 M 个（0 ≤ M ≤ 已缓冲量），处理器内部会缓存数据。
/// 采样均为交错的 s16 立体声，计数单位为“每声道采样点”。
pub trait TimeStretch: Send {
    fn put_samples(&mut self, samples: &[i16], nb_samples: usize) -> Result<()>;

    /// 最多取出 `max_samples` 个采样点追加到 `out`，返回实际数量
    fn receive_samples(&mut self, out: &mut Vec<i16>, max_samples: usize) -> usize;

    /// 丢弃内部缓存（seek 后调用）
    fn clear(&mut self);
}

const UNITY_EPSILON: f64 = 1e-4;

/// atempo 单级只接受 [0.5, 2.0]，超出范围时拆成多级
pub fn atempo_chain(factor: f64) -> Vec<f64> {
    let mut chain = Vec::new();
    if !(factor.is_finite() && factor > 0.0) || (factor - 1.0).abs() < UNITY_EPSILON {
        return chain;
    }
    let mut rest = factor;
    while rest > 2.0 {
        chain.push(2.0);
        rest /= 2.0;
    }
    while rest < 0.5 {
        chain.push(0.5);
        rest /= 0.5;
    }
    chain.push(rest);
    chain
}

/// 生成滤镜描述：变调用 asetrate + aresample，再用 atempo 修正速度
pub fn filter_spec(tempo: f32, pitch: f32, sample_rate: u32) -> String {
    let tempo = tempo as f64;
    let pitch = pitch as f64;
    let mut parts = Vec::new();

    if (pitch - 1.0).abs() >= UNITY_EPSILON {
        parts.push(format!("asetrate={}", (sample_rate as f64 * pitch).round() as u32));
        parts.push(format!("aresample={}", sample_rate));
    }
    for factor in atempo_chain(tempo / pitch) {
        parts.push(format!("atempo={:.6}", factor));
    }

    if parts.is_empty() {
        "anull".to_string()
    } else {
        parts.join(",")
    }
}

/// 基于 FFmpeg 滤镜图的变速变调实现
pub struct FilterTimeStretch {
    params: Arc<StretchParams>,
    graph: Option<filter::Graph>,
    graph_version: u64,
    next_pts: i64,
    ready: VecDeque<i16>,
}

// AVFilterGraph 只在音频线程中使用
unsafe impl Send for FilterTimeStretch {}

impl FilterTimeStretch {
    pub fn new(params: Arc<StretchParams>) -> Result<Self> {
        let mut stretch = Self {
            params,
            graph: None,
            graph_version: 0,
            next_pts: 0,
            ready: VecDeque::new(),
        };
        stretch.rebuild()?;
        Ok(stretch)
    }

    fn rebuild(&mut self) -> Result<()> {
        let version = self.params.version();
        let spec = filter_spec(self.params.tempo(), self.params.pitch(), TARGET_SAMPLE_RATE);

        let mut graph = filter::Graph::new();
        let args = format!(
            "time_base=1/{rate}:sample_rate={rate}:sample_fmt=s16:channel_layout=0x{layout:x}",
            rate = TARGET_SAMPLE_RATE,
            layout = ChannelLayout::STEREO.bits()
        );
        let abuffer = filter::find("abuffer")
            .ok_or_else(|| PlayerError::Other("找不到 abuffer 滤镜".to_string()))?;
        let abuffersink = filter::find("abuffersink")
            .ok_or_else(|| PlayerError::Other("找不到 abuffersink 滤镜".to_string()))?;
        graph.add(&abuffer, "in", &args)?;
        graph.add(&abuffersink, "out", "")?;
        {
            let mut out = graph
                .get("out")
                .ok_or_else(|| PlayerError::Other("滤镜图缺少输出端".to_string()))?;
            out.set_sample_format(util::format::Sample::I16(util::format::sample::Type::Packed));
            out.set_channel_layout(ChannelLayout::STEREO);
            out.set_sample_rate(TARGET_SAMPLE_RATE);
        }
        graph.output("in", 0)?.input("out", 0)?.parse(&spec)?;
        graph.validate()?;

        if self.graph.is_some() {
            info!("🎚 变速变调参数变更，重建滤镜: {}", spec);
        } else {
            debug!("🎚 初始化变速变调滤镜: {}", spec);
        }
        self.graph = Some(graph);
        self.graph_version = version;
        self.next_pts = 0;
        Ok(())
    }

    fn drain_sink(&mut self) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let Some(mut sink_ctx) = graph.get("out") else {
            return;
        };
        loop {
            let mut filtered = util::frame::Audio::empty();
            if sink_ctx.sink().frame(&mut filtered).is_err() {
                break;
            }
            let len = filtered.samples() * TARGET_CHANNELS as usize * TARGET_BYTES_PER_SAMPLE;
            if len == 0 {
                continue;
            }
            self.ready.extend(
                filtered.data(0)[..len]
                    .chunks_exact(TARGET_BYTES_PER_SAMPLE)
                    .map(|b| i16::from_ne_bytes([b[0], b[1]])),
            );
        }
    }
}

impl TimeStretch for FilterTimeStretch {
    fn put_samples(&mut self, samples: &[i16], nb_samples: usize) -> Result<()> {
        if self.params.version() != self.graph_version {
            self.rebuild()?;
        }
        if nb_samples == 0 {
            return Ok(());
        }

        let channels = TARGET_CHANNELS as usize;
        let count = (nb_samples * channels).min(samples.len());
        let mut frame = util::frame::Audio::new(
            util::format::Sample::I16(util::format::sample::Type::Packed),
            count / channels,
            ChannelLayout::STEREO,
        );
        frame.set_rate(TARGET_SAMPLE_RATE);
        frame.set_pts(Some(self.next_pts));
        self.next_pts += (count / channels) as i64;

        let bytes: &[u8] = bytemuck::cast_slice(&samples[..count]);
        frame.data_mut(0)[..bytes.len()].copy_from_slice(bytes);

        let graph = self
            .graph
            .as_mut()
            .ok_or_else(|| PlayerError::Other("滤镜图未初始化".to_string()))?;
        graph
            .get("in")
            .ok_or_else(|| PlayerError::Other("滤镜图缺少输入端".to_string()))?
            .source()
            .add(&frame)?;

        self.drain_sink();
        Ok(())
    }

    fn receive_samples(&mut self, out: &mut Vec<i16>, max_samples: usize) -> usize {
        let channels = TARGET_CHANNELS as usize;
        let available = self.ready.len() / channels;
        let take = available.min(max_samples);
        out.extend(self.ready.drain(..take * channels));
        take
    }

    fn clear(&mut self) {
        self.ready.clear();
        if let Err(e) = self.rebuild() {
            warn!("清空变速变调滤镜失败: {}", e);
            self.graph = None;
        }
    }
}
