use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 轨道时钟 - 记录最近一次解码帧的显示时间（秒）
///
/// 音频轨的时钟就是整个播放的主时钟，视频轨每帧都会读取它来计算休眠时长。
/// f64 以位模式存入原子变量，读写不会撕裂；跨线程只需要最终一致。
#[derive(Debug, Default)]
pub struct TrackClock {
    bits: Arc<AtomicU64>,
}

impl TrackClock {
    pub fn new() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    /// 当前时间（秒）
    pub fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    /// seek 时归零
    pub fn reset(&self) {
        self.set(0.0);
    }

    /// 只读句柄，交给需要对比时钟的一方
    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            bits: self.bits.clone(),
        }
    }
}

/// 只读时钟句柄
#[derive(Debug, Clone)]
pub struct ClockHandle {
    bits: Arc<AtomicU64>,
}

impl ClockHandle {
    /// 获取当前时间（秒）
    pub fn current_time(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
