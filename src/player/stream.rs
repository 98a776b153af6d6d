use crate::core::{PlaybackState, Result, StreamInfo, TrackClock};
use crate::player::packet_queue::PacketQueue;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use ffmpeg_next::Packet;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 入队的压缩包，携带入队时的 seek 代数
pub struct StreamPacket {
    pub epoch: u64,
    pub packet: Packet,
}

/// 单条基本流的公共部分：队列、解码器、时间基和时钟
///
/// 由轨道的工作线程和 seek 路径共享（`Arc<StreamCore<..>>`）。
/// 解码器放在独立的锁里：解码和 flush 不会同时进行。
pub struct StreamCore<D: ?Sized> {
    info: StreamInfo,
    total_duration: f64,
    queue: PacketQueue<StreamPacket>,
    codec: Mutex<Box<D>>,
    clock: TrackClock,
    last_reported_second: AtomicI64,
    seek_epoch: AtomicU64,
    /// 帧时间提交与 seek 重置互斥
    timeline: Mutex<()>,
}

impl<D: ?Sized> StreamCore<D> {
    pub fn new(
        info: StreamInfo,
        total_duration: f64,
        codec: Box<D>,
        queue_capacity: usize,
        state: Arc<PlaybackState>,
    ) -> Self {
        Self {
            info,
            total_duration,
            queue: PacketQueue::new(queue_capacity, state),
            codec: Mutex::new(codec),
            clock: TrackClock::new(),
            last_reported_second: AtomicI64::new(-1),
            seek_epoch: AtomicU64::new(0),
            timeline: Mutex::new(()),
        }
    }

    pub fn stream_index(&self) -> usize {
        self.info.index
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn queue(&self) -> &PacketQueue<StreamPacket> {
        &self.queue
    }

    pub fn clock(&self) -> &TrackClock {
        &self.clock
    }

    pub fn seek_epoch(&self) -> u64 {
        self.seek_epoch.load(Ordering::Acquire)
    }

    /// 解封装线程入队
    pub fn push(&self, packet: Packet, epoch: u64) {
        self.queue.push(StreamPacket { epoch, packet });
    }

    /// 出队当前代的包；旧代的包直接释放并返回 None，由调用方重试
    pub fn pop_current(&self) -> Option<Packet> {
        let item = self.queue.pop()?;
        if item.epoch != self.seek_epoch() {
            return None;
        }
        Some(item.packet)
    }

    /// 在解码器锁内执行操作
    pub fn with_codec<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut codec = self.codec.lock();
        f(&mut **codec)
    }

    /// 用帧的时间戳更新 time_current（秒），没有时间戳时保持不变
    pub fn update_time(&self, pts: Option<i64>) -> Option<f64> {
        let pts = pts?;
        let seconds = pts as f64 * self.info.time_base;
        self.clock.set(seconds);
        Some(seconds)
    }

    /// 以 `epoch` 代的身份提交一帧：更新时钟后在同一把锁内执行 `f`
    ///
    /// 期间发生过 seek 时什么都不写，返回 None。`f` 里不能再调用 seek。
    pub fn commit_frame<R>(
        &self,
        epoch: u64,
        pts: Option<i64>,
        f: impl FnOnce(Option<f64>) -> R,
    ) -> Option<R> {
        let _timeline = self.timeline.lock();
        if self.seek_epoch() != epoch {
            return None;
        }
        let seconds = self.update_time(pts);
        Some(f(seconds))
    }

    /// 整数秒变化时返回新的秒数
    pub fn take_progress(&self, seconds: f64) -> Option<i32> {
        let second = seconds as i64;
        let previous = self.last_reported_second.swap(second, Ordering::AcqRel);
        (previous != second).then_some(second as i32)
    }

    /// seek：清空队列，时钟和进度归零，进入新的一代
    pub fn seek_reset(&self) -> usize {
        let _timeline = self.timeline.lock();
        let cleared = self.queue.clear();
        self.clock.reset();
        self.last_reported_second.store(-1, Ordering::Release);
        self.seek_epoch.fetch_add(1, Ordering::AcqRel);
        cleared
    }
}

/// 轨道生命周期
pub trait MediaTrack {
    /// 打开工作线程需要的资源（失败视为准备失败）
    fn prepare_internal(&mut self) -> Result<()>;

    /// 启动工作线程
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// 唤醒并等待工作线程退出
    fn stop(&mut self);

    /// 释放剩余的包和资源
    fn release(&mut self);
}

/// 线程退出时发出完成信号（包括 panic 退出）
struct CompletionSignal(Sender<()>);

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// 工作线程句柄 + 一次性完成信号
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
}

impl Worker {
    pub fn spawn<F>(name: &str, f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _signal = CompletionSignal(done_tx);
                f();
            })?;
        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// 等待完成信号后 join，超过 `warn_after` 仍未退出时打印告警并继续等待
    pub fn join(&mut self, warn_after: Duration) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let start = Instant::now();
        if let Err(RecvTimeoutError::Timeout) = self.done_rx.recv_timeout(warn_after) {
            warn!(
                "{} ⚠️ {} 线程 {:?} 内未退出，继续等待",
                log_ctx(),
                self.name,
                warn_after
            );
            let _ = self.done_rx.recv();
        }
        if handle.join().is_err() {
            error!("{} ❌ {} 线程异常退出", log_ctx(), self.name);
        } else {
            info!("{} ✅ {} 线程已结束（{:?}）", log_ctx(), self.name, start.elapsed());
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("{} ⚠ {} 线程句柄被 drop，但未调用 join()", log_ctx(), self.name);
        }
    }
}
