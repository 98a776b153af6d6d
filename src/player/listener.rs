use crate::core::YuvFrame;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// 播放器对外通知
///
/// 回调可能来自解封装线程、音频线程或视频线程中的任意一个，
/// 实现方自行负责跨线程 / 跨运行时的投递。所有方法都有空实现，按需覆盖。
pub trait PlayerListener: Send + Sync {
    /// 准备完成，参数为总时长（秒）
    fn on_prepared(&self, _duration: i32) {}

    /// 音频队列是否为空（缓冲中）
    fn on_loading(&self, _loading: bool) {}

    /// 播放进度，仅在整数秒变化时回调
    fn on_progress(&self, _current: i32, _total: i32) {}

    fn on_completed(&self) {}

    /// 当前音频块的近似响度（dB）
    fn on_volume_db(&self, _db: i32) {}

    fn on_error(&self, _code: i32, _message: &str) {}

    /// 一帧 YUV420P 视频
    fn on_render_yuv(&self, _frame: &YuvFrame) {}

    fn on_paused(&self) {}

    fn on_resumed(&self) {}

    fn on_stopped(&self) {}
}

/// 通知事件（视频帧只保留尺寸和时间戳）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    Prepared { duration: i32 },
    Loading { loading: bool },
    Progress { current: i32, total: i32 },
    Completed,
    VolumeDb { db: i32 },
    Error { code: i32, message: String },
    RenderYuv { width: u32, height: u32, pts: Option<i64> },
    Paused,
    Resumed,
    Stopped,
}

const LOADING_UNKNOWN: u8 = 2;

/// 把通知转成 [`PlayerEvent`] 发到 channel 中
///
/// loading 每个音频周期都会上报一次，这里只在值变化时转发。
pub struct ChannelListener {
    tx: Sender<PlayerEvent>,
    last_loading: AtomicU8,
}

impl ChannelListener {
    pub fn new(tx: Sender<PlayerEvent>) -> Self {
        Self {
            tx,
            last_loading: AtomicU8::new(LOADING_UNKNOWN),
        }
    }

    /// 创建一对 listener 和接收端
    pub fn unbounded() -> (Self, Receiver<PlayerEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    fn send(&self, event: PlayerEvent) {
        // 接收端已关闭时直接丢弃
        let _ = self.tx.send(event);
    }
}

impl PlayerListener for ChannelListener {
    fn on_prepared(&self, duration: i32) {
        self.send(PlayerEvent::Prepared { duration });
    }

    fn on_loading(&self, loading: bool) {
        let value = loading as u8;
        if self.last_loading.swap(value, Ordering::AcqRel) != value {
            self.send(PlayerEvent::Loading { loading });
        }
    }

    fn on_progress(&self, current: i32, total: i32) {
        self.send(PlayerEvent::Progress { current, total });
    }

    fn on_completed(&self) {
        self.send(PlayerEvent::Completed);
    }

    fn on_volume_db(&self, db: i32) {
        self.send(PlayerEvent::VolumeDb { db });
    }

    fn on_error(&self, code: i32, message: &str) {
        self.send(PlayerEvent::Error {
            code,
            message: message.to_string(),
        });
    }

    fn on_render_yuv(&self, frame: &YuvFrame) {
        self.send(PlayerEvent::RenderYuv {
            width: frame.width,
            height: frame.height,
            pts: frame.pts,
        });
    }

    fn on_paused(&self) {
        self.send(PlayerEvent::Paused);
    }

    fn on_resumed(&self) {
        self.send(PlayerEvent::Resumed);
    }

    fn on_stopped(&self) {
        self.send(PlayerEvent::Stopped);
    }
}
