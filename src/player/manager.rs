use crate::core::{
    ChannelLayout, PlaybackState, PlayerConfig, PlayerError, PlayerPhase, Result, AV_TIME_BASE,
};
use crate::player::audio_output::OutputControls;
use crate::player::audio_track::{
    cpal_sink_factory, filter_stretch_factory, AudioTrack, SinkFactory, StretchFactory,
};
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::{AudioDecode, DemuxerSource, VideoDecode};
use crate::player::demuxer_thread::{DemuxLoop, SharedSource};
use crate::player::listener::PlayerListener;
use crate::player::stream::{log_ctx, MediaTrack, StreamCore, Worker};
use crate::player::time_stretch::StretchParams;
use crate::player::video_track::VideoTrack;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 可替换的音频输出 / 变速变调实现
#[derive(Clone)]
pub struct Backends {
    pub audio_sink: SinkFactory,
    pub time_stretch: StretchFactory,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            audio_sink: cpal_sink_factory(),
            time_stretch: filter_stretch_factory(),
        }
    }
}

/// 一次播放会话：从 prepare 到 stop
struct Session {
    state: Arc<PlaybackState>,
    source: SharedSource,
    audio: AudioTrack,
    video: Option<VideoTrack>,
    demux_worker: Option<Worker>,
    total_duration: f64,
}

impl Session {
    fn start(&mut self, listener: &Arc<dyn PlayerListener>, config: &PlayerConfig) -> Result<()> {
        self.audio.play()?;
        if let Some(video) = self.video.as_mut() {
            video.play()?;
        }

        let demux = DemuxLoop {
            source: self.source.clone(),
            state: self.state.clone(),
            audio: self.audio.core().clone(),
            video: self.video.as_ref().map(|v| v.core().clone()),
            listener: listener.clone(),
            config: config.clone(),
        };
        self.demux_worker = Some(Worker::spawn("demux", move || demux.run())?);
        Ok(())
    }

    fn seek(&self, seconds: f64) {
        self.state.set_seeking(true);
        {
            let mut source = self.source.lock();

            let audio_cleared = self.audio.core().seek_reset();
            let video_cleared = self.video.as_ref().map_or(0, |v| v.core().seek_reset());
            debug!(
                "{} 🧹 Seek 清空队列: {} 音频包, {} 视频包",
                log_ctx(),
                audio_cleared,
                video_cleared
            );

            let timestamp = (seconds * AV_TIME_BASE as f64) as i64;
            if let Err(e) = source.seek(timestamp) {
                warn!("{} ❌ Seek 失败: {}", log_ctx(), e);
            }

            self.audio.core().with_codec(|codec| codec.flush());
            if let Some(video) = self.video.as_ref() {
                video.core().with_codec(|codec| codec.flush());
            }
        }
        self.state.set_seeking(false);
    }

    /// 停止所有线程并释放资源，可重复调用
    fn shutdown(&mut self, config: &PlayerConfig) {
        self.state.stop();
        self.audio.core().queue().notify_all();
        if let Some(video) = self.video.as_ref() {
            video.core().queue().notify_all();
        }

        if let Some(mut worker) = self.demux_worker.take() {
            worker.join(config.worker_join_warn());
        }
        self.audio.stop();
        if let Some(video) = self.video.as_mut() {
            video.stop();
        }

        self.audio.release();
        if let Some(video) = self.video.as_mut() {
            video.release();
        }
    }
}

/// 播放器 - 整体控制播放流程
///
/// 状态：Idle → Prepared → Playing ⇄ Paused → Stopped。
/// 非法调用（未 play 就 pause、越界 seek 等）只记录日志，不回调、不改变状态。
pub struct MediaPlayer {
    config: PlayerConfig,
    listener: Arc<dyn PlayerListener>,
    backends: Backends,
    controls: Arc<OutputControls>,
    stretch_params: Arc<StretchParams>,
    data_source: Option<String>,
    phase: Mutex<PlayerPhase>,
    session: Option<Session>,
}

impl MediaPlayer {
    /// 使用 cpal 输出和 FFmpeg 滤镜变速变调
    pub fn new(config: PlayerConfig, listener: Arc<dyn PlayerListener>) -> Result<Self> {
        Self::with_backends(config, listener, Backends::default())
    }

    pub fn with_backends(
        config: PlayerConfig,
        listener: Arc<dyn PlayerListener>,
        backends: Backends,
    ) -> Result<Self> {
        config.validate()?;
        info!("{} 🎮 创建播放器...", log_ctx());
        Ok(Self {
            controls: Arc::new(OutputControls::new(config.default_volume)),
            stretch_params: Arc::new(StretchParams::new()),
            config,
            listener,
            backends,
            data_source: None,
            phase: Mutex::new(PlayerPhase::Idle),
            session: None,
        })
    }

    /// 当前阶段；播放中收到 completed 之后报告 `Completed`
    pub fn phase(&self) -> PlayerPhase {
        let phase = *self.phase.lock();
        let completed = self
            .session
            .as_ref()
            .is_some_and(|s| s.state.is_completed());
        match phase {
            PlayerPhase::Playing | PlayerPhase::Paused if completed => PlayerPhase::Completed,
            other => other,
        }
    }

    fn set_phase(&self, phase: PlayerPhase) {
        *self.phase.lock() = phase;
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn set_data_source(&mut self, uri: impl Into<String>) {
        self.data_source = Some(uri.into());
    }

    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    /// 准备之前设置的数据源
    pub fn prepare(&mut self) -> Result<()> {
        let Some(uri) = self.data_source.clone() else {
            warn!("{} ⚠️ prepare() 之前没有设置数据源", log_ctx());
            return Err(PlayerError::InvalidState("没有设置数据源".to_string()));
        };
        self.prepare_uri(&uri)
    }

    /// 打开并准备指定的数据源
    pub fn prepare_uri(&mut self, uri: &str) -> Result<()> {
        self.ensure_no_session("prepare")?;
        self.data_source = Some(uri.to_string());

        match Demuxer::open(uri) {
            Ok(demuxer) => self.prepare_with_source(Box::new(demuxer)),
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// 使用已经打开的数据源准备会话
    pub fn prepare_with_source(&mut self, source: Box<dyn DemuxerSource>) -> Result<()> {
        self.ensure_no_session("prepare")?;
        info!("{} 📎 准备数据源: {}", log_ctx(), source.description());

        match self.build_session(source) {
            Ok(session) => {
                let duration = session.total_duration;
                self.session = Some(session);
                self.set_phase(PlayerPhase::Prepared);
                info!("{} ✅ 准备完成，总时长 {:.3}s", log_ctx(), duration);
                self.listener.on_prepared(duration as i32);
                Ok(())
            }
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    fn ensure_no_session(&self, operation: &str) -> Result<()> {
        if self.session.is_some() {
            warn!("{} ⚠️ 会话仍在进行，忽略 {}()", log_ctx(), operation);
            return Err(PlayerError::InvalidState(format!(
                "会话仍在进行，无法 {}",
                operation
            )));
        }
        Ok(())
    }

    fn report_error(&self, e: &PlayerError) {
        error!("{} ❌ 准备失败: {}", log_ctx(), e);
        self.set_phase(PlayerPhase::Idle);
        self.listener.on_error(e.code(), &e.to_string());
    }

    fn build_session(&self, source: Box<dyn DemuxerSource>) -> Result<Session> {
        let media_info = source.media_info().clone();
        let total_duration = media_info.duration;
        let state = Arc::new(PlaybackState::new());

        let audio_info = media_info.audio.ok_or(PlayerError::NoAudioStream)?;
        let audio_codec = source.open_audio_decoder()?;
        let audio_core: Arc<StreamCore<dyn AudioDecode>> = Arc::new(StreamCore::new(
            audio_info,
            total_duration,
            audio_codec,
            self.config.queue_capacity,
            state.clone(),
        ));

        let mut audio = AudioTrack::new(
            audio_core.clone(),
            state.clone(),
            self.listener.clone(),
            self.config.clone(),
            self.controls.clone(),
            self.stretch_params.clone(),
            self.backends.audio_sink.clone(),
            self.backends.time_stretch.clone(),
        );
        audio.prepare_internal()?;

        // 视频流缺失或无法解码时只播放音频
        let video = match media_info.video {
            Some(video_info) => match source.open_video_decoder() {
                Ok(codec) => {
                    let video_core: Arc<StreamCore<dyn VideoDecode>> = Arc::new(StreamCore::new(
                        video_info,
                        total_duration,
                        codec,
                        self.config.queue_capacity,
                        state.clone(),
                    ));
                    let mut track = VideoTrack::new(
                        video_core,
                        state.clone(),
                        self.listener.clone(),
                        self.config.clone(),
                        audio_core.clock().handle(),
                    );
                    track.prepare_internal()?;
                    Some(track)
                }
                Err(e) => {
                    warn!("{} ⚠️ 视频解码器打开失败，仅播放音频: {}", log_ctx(), e);
                    None
                }
            },
            None => {
                info!("{} 没有视频流，仅播放音频", log_ctx());
                None
            }
        };

        Ok(Session {
            state,
            source: Arc::new(Mutex::new(source)),
            audio,
            video,
            demux_worker: None,
            total_duration,
        })
    }

    /// 开始播放（已在播放时为空操作）
    pub fn play(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            warn!("{} ⚠️ 尚未 prepare，忽略 play()", log_ctx());
            return Ok(());
        };
        if !session.state.start_playing() {
            debug!("{} 已在播放，忽略 play()", log_ctx());
            return Ok(());
        }

        info!("{} 🎬 播放", log_ctx());
        if let Err(e) = session.start(&self.listener, &self.config) {
            error!("{} ❌ 启动播放线程失败: {}", log_ctx(), e);
            session.shutdown(&self.config);
            self.session = None;
            self.set_phase(PlayerPhase::Stopped);
            return Err(e);
        }
        self.set_phase(PlayerPhase::Playing);
        Ok(())
    }

    pub fn pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            warn!("{} ⚠️ 没有会话，忽略 pause()", log_ctx());
            return;
        };
        if !session.state.is_playing() {
            warn!("{} ⚠️ 尚未播放，忽略 pause()", log_ctx());
            return;
        }
        if !session.state.set_pausing() {
            debug!("{} 已暂停，忽略 pause()", log_ctx());
            return;
        }
        session.audio.pause();
        if let Some(video) = session.video.as_mut() {
            video.pause();
        }
        info!("{} ⏸ 暂停", log_ctx());
        self.set_phase(PlayerPhase::Paused);
        self.listener.on_paused();
    }

    pub fn resume(&mut self) {
        let Some(session) = self.session.as_mut() else {
            warn!("{} ⚠️ 没有会话，忽略 resume()", log_ctx());
            return;
        };
        if !session.state.is_playing() || !session.state.clear_pausing() {
            warn!("{} ⚠️ 没有处于暂停状态，忽略 resume()", log_ctx());
            return;
        }
        session.audio.resume();
        if let Some(video) = session.video.as_mut() {
            video.resume();
        }
        info!("{} ▶ 恢复播放", log_ctx());
        self.set_phase(PlayerPhase::Playing);
        self.listener.on_resumed();
    }

    /// 跳转到 `seconds`，范围 [0, 总时长)，总时长按整秒截断
    pub fn seek(&self, seconds: f64) {
        let Some(session) = self.session.as_ref() else {
            warn!("{} ⚠️ 没有会话，忽略 seek()", log_ctx());
            return;
        };
        let limit = session.total_duration.trunc();
        if !(seconds >= 0.0 && seconds < limit) {
            warn!(
                "{} ⚠️ Seek 位置越界: {:.3}s（总时长 {}s）",
                log_ctx(),
                seconds,
                limit
            );
            return;
        }
        info!("{} 🎯 Seek 到: {:.3}s", log_ctx(), seconds);
        session.seek(seconds);
        info!("{} ✅ Seek 完成: {:.3}s", log_ctx(), seconds);
    }

    /// 停止并释放当前会话；没有会话时为空操作
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            debug!("{} 没有会话，忽略 stop()", log_ctx());
            return;
        };
        info!("{} ⏹️ 停止播放", log_ctx());
        session.shutdown(&self.config);
        self.set_phase(PlayerPhase::Stopped);
        info!("{} ✅ 停止播放完成，所有线程已清理", log_ctx());
        self.listener.on_stopped();
    }

    /// 切换到新的数据源：停止当前会话后重新 prepare
    pub fn next(&mut self, uri: &str) -> Result<()> {
        info!("{} ⏭ 切换数据源: {}", log_ctx(), uri);
        self.stop();
        self.prepare_uri(uri)
    }

    pub fn set_volume(&self, percent: i32) {
        if self.controls.set_volume(percent) {
            debug!("{} 🔈 音量: {}", log_ctx(), percent);
        }
    }

    pub fn volume(&self) -> u8 {
        self.controls.volume()
    }

    pub fn set_channel_layout(&self, layout: ChannelLayout) {
        debug!("{} 🔈 声道: {:?}", log_ctx(), layout);
        self.controls.set_channel_layout(layout);
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.controls.channel_layout()
    }

    pub fn set_pitch(&self, pitch: f32) {
        if self.stretch_params.set_pitch(pitch) {
            debug!("{} 🎚 音调: {}", log_ctx(), pitch);
        }
    }

    pub fn pitch(&self) -> f32 {
        self.stretch_params.pitch()
    }

    pub fn set_tempo(&self, tempo: f32) {
        if self.stretch_params.set_tempo(tempo) {
            debug!("{} 🎚 速度: {}", log_ctx(), tempo);
        }
    }

    pub fn tempo(&self) -> f32 {
        self.stretch_params.tempo()
    }

    /// 音频主时钟（秒），没有会话时为 0
    pub fn current_position(&self) -> f64 {
        self.session
            .as_ref()
            .map_or(0.0, |s| s.audio.core().clock().now())
    }

    pub fn total_duration(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.total_duration)
    }

    pub fn has_video(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.video.is_some())
    }

    /// 各队列当前的包数 (音频, 视频)
    pub fn queue_sizes(&self) -> (usize, usize) {
        self.session.as_ref().map_or((0, 0), |s| {
            (
                s.audio.core().queue().size(),
                s.video.as_ref().map_or(0, |v| v.core().queue().size()),
            )
        })
    }
}

impl Drop for MediaPlayer {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.stop();
        }
    }
}
