use crate::core::{PlaybackState, PlayerConfig};
use crate::player::demuxer_source::{AudioDecode, DemuxerSource, ReadOutcome, VideoDecode};
use crate::player::listener::PlayerListener;
use crate::player::stream::{log_ctx, StreamCore};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 格式上下文锁：解封装读包和 seek 共用
pub type SharedSource = Arc<Mutex<Box<dyn DemuxerSource>>>;

/// 解封装线程运行所需的全部共享对象
pub struct DemuxLoop {
    pub source: SharedSource,
    pub state: Arc<PlaybackState>,
    pub audio: Arc<StreamCore<dyn AudioDecode>>,
    pub video: Option<Arc<StreamCore<dyn VideoDecode>>>,
    pub listener: Arc<dyn PlayerListener>,
    pub config: PlayerConfig,
}

/// 读包统计（仅用于日志）
#[derive(Debug, Default)]
struct DemuxStats {
    total: usize,
    audio: usize,
    video: usize,
    dropped: usize,
}

const LOG_FIRST_N: usize = 5;

impl DemuxLoop {
    /// 解封装循环（在独立线程中运行）
    ///
    /// - 按 stream index 把包分发到音频 / 视频队列，队列满时 push 阻塞形成背压
    /// - 暂停时阻塞在暂停条件上，seeking 时定时重试
    /// - EOF：轮询等待音频队列排空后上报 completed 并退出
    /// - 非 EOF 读错误：记录后退避重试
    pub fn run(self) {
        let description = self.source.lock().description();
        info!("{} 🎬 Demuxer 线程启动: {}", log_ctx(), description);

        let mut stats = DemuxStats::default();

        while self.state.is_playing() {
            if self.state.is_pausing() {
                self.state.wait_while_paused();
                continue;
            }
            if self.state.is_seeking() {
                self.state.park(self.config.seek_retry_interval());
                continue;
            }

            // 读包和 seek 代数在同一把锁内取得，保证两者一致
            let (outcome, audio_epoch, video_epoch) = {
                let mut source = self.source.lock();
                let outcome = source.read_packet();
                (
                    outcome,
                    self.audio.seek_epoch(),
                    self.video.as_ref().map(|v| v.seek_epoch()),
                )
            };

            match outcome {
                Ok(ReadOutcome::Packet(packet)) => {
                    stats.total += 1;
                    let index = packet.stream();

                    if index == self.audio.stream_index() {
                        stats.audio += 1;
                        if stats.audio <= LOG_FIRST_N || stats.audio % 100 == 0 {
                            debug!(
                                "{} 🔊 Demuxer 读取音频包 #{}（total packets {}）",
                                log_ctx(),
                                stats.audio,
                                stats.total
                            );
                        }
                        self.audio.push(packet, audio_epoch);
                    } else if let (Some(video), Some(epoch)) = (self.video.as_ref(), video_epoch) {
                        if index == video.stream_index() {
                            stats.video += 1;
                            if stats.video <= LOG_FIRST_N || stats.video % 100 == 0 {
                                debug!(
                                    "{} 📦 Demuxer 读取视频包 #{}（total packets {}）",
                                    log_ctx(),
                                    stats.video,
                                    stats.total
                                );
                            }
                            video.push(packet, epoch);
                        } else {
                            stats.dropped += 1;
                        }
                    } else {
                        stats.dropped += 1;
                    }
                }
                Ok(ReadOutcome::EndOfStream) => {
                    info!("{} 📄 Demuxer 到达文件末尾，等待音频队列排空", log_ctx());
                    if self.drain_audio(audio_epoch) {
                        info!("{} 🏁 音频队列已排空，播放完成", log_ctx());
                        self.state.mark_completed();
                        self.listener.on_completed();
                        break;
                    }
                    // 排空期间发生了 seek，继续读包
                    info!("{} ⏩ 排空期间发生 seek，继续读取", log_ctx());
                }
                Err(e) => {
                    warn!("{} ⚠️ 读取包失败（稍后重试）: {}", log_ctx(), e);
                    self.state.park(self.config.read_error_backoff());
                }
            }
        }

        info!(
            "{} 🛑 Demuxer 线程退出（共读取 {} 个包：{} 视频，{} 音频，{} 丢弃）",
            log_ctx(),
            stats.total,
            stats.video,
            stats.audio,
            stats.dropped
        );
    }

    /// 轮询直到音频队列为空；返回 false 表示期间发生了 seek 或已停止
    fn drain_audio(&self, epoch: u64) -> bool {
        loop {
            if !self.state.is_playing() {
                return false;
            }
            if self.state.is_seeking() || self.audio.seek_epoch() != epoch {
                return false;
            }
            if self.audio.queue().is_empty() {
                return true;
            }
            self.state.park(self.config.drain_poll_interval());
        }
    }
}
