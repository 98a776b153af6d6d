use crate::core::{ClockHandle, PlaybackState, PlayerConfig, PlayerError, Result};
use crate::player::demuxer_source::VideoDecode;
use crate::player::listener::PlayerListener;
use crate::player::stream::{log_ctx, MediaTrack, StreamCore, Worker};
use crate::player::sync::SyncController;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// 视频轨：按音频主时钟控制出帧节奏
pub struct VideoTrack {
    core: Arc<StreamCore<dyn VideoDecode>>,
    state: Arc<PlaybackState>,
    listener: Arc<dyn PlayerListener>,
    config: PlayerConfig,
    master: ClockHandle,
    sync: Option<SyncController>,
    worker: Option<Worker>,
}

impl VideoTrack {
    pub fn new(
        core: Arc<StreamCore<dyn VideoDecode>>,
        state: Arc<PlaybackState>,
        listener: Arc<dyn PlayerListener>,
        config: PlayerConfig,
        master: ClockHandle,
    ) -> Self {
        Self {
            core,
            state,
            listener,
            config,
            master,
            sync: None,
            worker: None,
        }
    }

    pub fn core(&self) -> &Arc<StreamCore<dyn VideoDecode>> {
        &self.core
    }
}

impl MediaTrack for VideoTrack {
    fn prepare_internal(&mut self) -> Result<()> {
        let frame_rate = self.core.info().frame_rate;
        let sync = SyncController::from_frame_rate(frame_rate, self.config.fallback_frame_delay_secs);
        if frame_rate.0 <= 0 || frame_rate.1 <= 0 {
            warn!(
                "{} 视频帧率不可用 {:?}，使用默认帧间隔 {}s",
                log_ctx(),
                frame_rate,
                sync.default_delay()
            );
        }
        debug!(
            "{} 🎬 视频轨准备完成: stream #{}, 帧间隔 {:.4}s",
            log_ctx(),
            self.core.stream_index(),
            sync.default_delay()
        );
        self.sync = Some(sync);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let sync = self
            .sync
            .ok_or_else(|| PlayerError::InvalidState("视频轨未准备".to_string()))?;

        let pipeline = VideoPipeline {
            core: self.core.clone(),
            state: self.state.clone(),
            listener: self.listener.clone(),
            config: self.config.clone(),
            master: self.master.clone(),
            sync,
        };
        self.worker = Some(Worker::spawn("video-decode", move || pipeline.run())?);
        Ok(())
    }

    fn pause(&mut self) {
        debug!("{} 🎬 视频轨暂停", log_ctx());
    }

    fn resume(&mut self) {
        debug!("{} 🎬 视频轨恢复", log_ctx());
    }

    fn stop(&mut self) {
        self.core.queue().notify_all();
        if let Some(mut worker) = self.worker.take() {
            worker.join(self.config.worker_join_warn());
        }
    }

    fn release(&mut self) {
        let dropped = self.core.queue().clear();
        self.sync = None;
        debug!("{} 🗑️ 视频轨释放，丢弃 {} 个包", log_ctx(), dropped);
    }
}

struct VideoPipeline {
    core: Arc<StreamCore<dyn VideoDecode>>,
    state: Arc<PlaybackState>,
    listener: Arc<dyn PlayerListener>,
    config: PlayerConfig,
    master: ClockHandle,
    sync: SyncController,
}

impl VideoPipeline {
    fn run(mut self) {
        info!("{} 🎬 视频线程启动", log_ctx());
        let mut rendered: u64 = 0;

        while self.state.is_playing() {
            if self.state.is_pausing() {
                self.state.wait_while_paused();
                continue;
            }
            if self.state.is_seeking() {
                self.state.park(self.config.seek_retry_interval());
                continue;
            }

            let epoch = self.core.seek_epoch();
            let Some(packet) = self.core.pop_current() else {
                continue;
            };

            let frames = match self.core.with_codec(|codec| codec.decode(&packet)) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!("{} 视频解码错误（已跳过）: {}", log_ctx(), e);
                    continue;
                }
            };

            for frame in frames {
                if !self.state.is_playing() {
                    break;
                }
                if self.core.commit_frame(epoch, frame.pts, |_| ()).is_none() {
                    break;
                }
                self.listener.on_render_yuv(&frame);
                rendered += 1;

                if !self.state.is_seeking() {
                    let delay = self.sync_delay();
                    self.state.park(Duration::from_secs_f64(delay));
                }
            }
        }

        info!("{} 🎬 视频线程退出（共 {} 帧）", log_ctx(), rendered);
    }

    /// 对比音频主时钟，返回下一帧前的休眠时长（秒）
    fn sync_delay(&mut self) -> f64 {
        let time_diff = self.master.current_time() - self.core.clock().now();
        let delay = self.sync.next_delay(time_diff);
        if delay.is_finite() {
            delay.max(0.0)
        } else {
            self.sync.default_delay()
        }
    }
}
