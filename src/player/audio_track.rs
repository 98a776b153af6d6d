use crate::core::{PlaybackState, PlayerConfig, PlayerError, Result, TARGET_BYTES_PER_SAMPLE, TARGET_CHANNELS};
use crate::player::audio_output::{AudioSink, CpalAudioSink, OutputControls};
use crate::player::demuxer_source::AudioDecode;
use crate::player::listener::PlayerListener;
use crate::player::stream::{log_ctx, MediaTrack, StreamCore, Worker};
use crate::player::time_stretch::{FilterTimeStretch, StretchParams, TimeStretch};
use log::{debug, info, warn};
use std::sync::Arc;

/// 创建音频输出（在音频线程中 open）
pub type SinkFactory = Arc<dyn Fn(Arc<OutputControls>) -> Box<dyn AudioSink> + Send + Sync>;

/// 创建变速变调处理器
pub type StretchFactory =
    Arc<dyn Fn(Arc<StretchParams>) -> Result<Box<dyn TimeStretch>> + Send + Sync>;

pub fn cpal_sink_factory() -> SinkFactory {
    Arc::new(|controls: Arc<OutputControls>| {
        Box::new(CpalAudioSink::new(controls)) as Box<dyn AudioSink>
    })
}

pub fn filter_stretch_factory() -> StretchFactory {
    Arc::new(|params: Arc<StretchParams>| {
        Ok(Box::new(FilterTimeStretch::new(params)?) as Box<dyn TimeStretch>)
    })
}

/// 每个周期最多交给音频输出的采样点数（每声道）
const MAX_SAMPLES_PER_CYCLE: usize = 4096;

/// 近似响度：16bit 采样绝对值的平均值取 20*log10，平均值为 0 时为 0
pub fn loudness_db(samples: &[i16]) -> i32 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u64 = samples.iter().map(|s| s.unsigned_abs() as u64).sum();
    let average = (sum / samples.len() as u64) as i32;
    if average > 0 {
        (20.0 * (average as f64).log10()) as i32
    } else {
        0
    }
}

/// 音频轨：主时钟
pub struct AudioTrack {
    core: Arc<StreamCore<dyn AudioDecode>>,
    state: Arc<PlaybackState>,
    listener: Arc<dyn PlayerListener>,
    config: PlayerConfig,
    controls: Arc<OutputControls>,
    stretch_params: Arc<StretchParams>,
    sink_factory: SinkFactory,
    stretch_factory: StretchFactory,
    stretch: Option<Box<dyn TimeStretch>>,
    worker: Option<Worker>,
}

impl AudioTrack {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        core: Arc<StreamCore<dyn AudioDecode>>,
        state: Arc<PlaybackState>,
        listener: Arc<dyn PlayerListener>,
        config: PlayerConfig,
        controls: Arc<OutputControls>,
        stretch_params: Arc<StretchParams>,
        sink_factory: SinkFactory,
        stretch_factory: StretchFactory,
    ) -> Self {
        Self {
            core,
            state,
            listener,
            config,
            controls,
            stretch_params,
            sink_factory,
            stretch_factory,
            stretch: None,
            worker: None,
        }
    }

    pub fn core(&self) -> &Arc<StreamCore<dyn AudioDecode>> {
        &self.core
    }
}

impl MediaTrack for AudioTrack {
    fn prepare_internal(&mut self) -> Result<()> {
        let stretch = (self.stretch_factory)(self.stretch_params.clone())
            .map_err(|e| PlayerError::ResampleError(format!("create time stretch failed: {}", e)))?;
        self.stretch = Some(stretch);
        debug!(
            "{} 🔊 音频轨准备完成: stream #{}, time_base={}",
            log_ctx(),
            self.core.stream_index(),
            self.core.info().time_base
        );
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let stretch = self
            .stretch
            .take()
            .ok_or_else(|| PlayerError::InvalidState("音频轨未准备".to_string()))?;

        let pipeline = AudioPipeline {
            core: self.core.clone(),
            state: self.state.clone(),
            listener: self.listener.clone(),
            config: self.config.clone(),
            stretch,
            sink: (self.sink_factory)(self.controls.clone()),
            seen_epoch: self.core.seek_epoch(),
            out: Vec::with_capacity(MAX_SAMPLES_PER_CYCLE * TARGET_CHANNELS as usize),
        };
        self.worker = Some(Worker::spawn("audio-decode", move || pipeline.run())?);
        Ok(())
    }

    fn pause(&mut self) {
        debug!("{} 🔊 音频轨暂停", log_ctx());
    }

    fn resume(&mut self) {
        debug!("{} 🔊 音频轨恢复", log_ctx());
    }

    fn stop(&mut self) {
        self.core.queue().notify_all();
        if let Some(mut worker) = self.worker.take() {
            worker.join(self.config.worker_join_warn());
        }
    }

    fn release(&mut self) {
        let dropped = self.core.queue().clear();
        self.stretch = None;
        debug!("{} 🗑️ 音频轨释放，丢弃 {} 个包", log_ctx(), dropped);
    }
}

/// 音频线程持有的部分
pub(crate) struct AudioPipeline {
    core: Arc<StreamCore<dyn AudioDecode>>,
    state: Arc<PlaybackState>,
    listener: Arc<dyn PlayerListener>,
    config: PlayerConfig,
    stretch: Box<dyn TimeStretch>,
    sink: Box<dyn AudioSink>,
    seen_epoch: u64,
    out: Vec<i16>,
}

impl AudioPipeline {
    fn run(mut self) {
        info!("{} 🔊 音频线程启动", log_ctx());

        if let Err(e) = self.sink.open() {
            warn!("{} ❌ 打开音频输出失败: {}", log_ctx(), e);
            self.listener.on_error(e.code(), &e.to_string());
            return;
        }

        while self.state.is_playing() {
            if self.state.is_pausing() {
                self.wait_paused();
                continue;
            }
            if self.state.is_seeking() {
                self.state.park(self.config.seek_retry_interval());
                continue;
            }
            if self.fill_buffer() == 0 {
                continue;
            }
            self.write_out();
        }

        self.sink.close();
        info!("{} 🔊 音频线程退出", log_ctx());
    }

    fn wait_paused(&mut self) {
        self.sink.pause();
        self.state.wait_while_paused();
        self.sink.resume();
    }

    /// seek 之后丢弃变速变调和输出设备中的旧数据
    fn sync_epoch(&mut self) {
        let epoch = self.core.seek_epoch();
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            self.stretch.clear();
            self.sink.clear();
            debug!("{} 🧹 seek 后清空音频缓冲", log_ctx());
        }
    }

    /// 生产一块可播放的 PCM，返回字节数（0 表示本周期没有数据）
    fn fill_buffer(&mut self) -> usize {
        self.out.clear();

        loop {
            if !self.state.is_playing() || self.state.is_pausing() || self.state.is_seeking() {
                return 0;
            }
            self.sync_epoch();

            if self.stretch.receive_samples(&mut self.out, MAX_SAMPLES_PER_CYCLE) > 0 {
                break;
            }

            self.listener.on_loading(self.core.queue().is_empty());

            let epoch = self.core.seek_epoch();
            let Some(packet) = self.core.pop_current() else {
                return 0;
            };

            let frames = match self.core.with_codec(|codec| codec.decode(&packet)) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!("{} 音频解码错误（已跳过）: {}", log_ctx(), e);
                    continue;
                }
            };

            for frame in frames {
                let core = &self.core;
                let listener = &self.listener;
                let committed = core.commit_frame(epoch, frame.pts, |seconds| {
                    if let Some(second) = seconds.and_then(|t| core.take_progress(t)) {
                        listener.on_progress(second, core.total_duration() as i32);
                    }
                });
                // 解码期间发生了 seek，结果作废
                if committed.is_none() {
                    break;
                }
                if let Err(e) = self.stretch.put_samples(&frame.samples, frame.nb_samples) {
                    warn!("{} 变速变调处理失败（已跳过）: {}", log_ctx(), e);
                }
            }
        }

        self.listener.on_volume_db(loudness_db(&self.out));
        self.pcm_bytes().len()
    }

    /// 本周期的 PCM 字节视图，下一周期会被覆盖
    fn pcm_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.out)
    }

    fn write_out(&mut self) {
        let timeout = self.config.sink_write_timeout();
        let epoch = self.seen_epoch;
        let mut offset = 0;

        while offset < self.out.len() && self.state.is_playing() {
            if self.state.is_seeking() || self.core.seek_epoch() != epoch {
                break;
            }
            if self.state.is_pausing() {
                self.wait_paused();
                continue;
            }
            offset += self.sink.write(&self.out[offset..], timeout);
        }

        if offset < self.out.len() {
            debug!(
                "{} 音频块未写完即中断: {}/{} 字节",
                log_ctx(),
                offset * TARGET_BYTES_PER_SAMPLE,
                self.out.len() * TARGET_BYTES_PER_SAMPLE
            );
        }
    }
}
