/// 超过约一帧（30fps）的偏差才调整延时
pub const SYNC_THRESHOLD: f64 = 0.016;

/// 大偏差阈值：超过后直接追赶 / 强制放慢
pub const LARGE_DRIFT: f64 = 0.25;

/// 根据帧率计算默认帧间隔，帧率不可用时使用 `fallback`
pub fn default_frame_delay(frame_rate: (i32, i32), fallback: f64) -> f64 {
    let (num, den) = frame_rate;
    if num > 0 && den > 0 {
        den as f64 / num as f64
    } else {
        fallback
    }
}

/// 视频帧间延时控制器
///
/// `time_diff = 音频时钟 - 视频时钟`，为正表示视频落后。
/// 延时围绕默认值在 [default/2, default*2] 之间摆动，
/// 大偏差时取 0（立即追赶）或 2*default（强制放慢）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncController {
    default_delay: f64,
    delay: f64,
}

impl SyncController {
    pub fn new(default_delay: f64) -> Self {
        Self {
            default_delay,
            delay: default_delay,
        }
    }

    pub fn from_frame_rate(frame_rate: (i32, i32), fallback: f64) -> Self {
        Self::new(default_frame_delay(frame_rate, fallback))
    }

    pub fn default_delay(&self) -> f64 {
        self.default_delay
    }

    pub fn current(&self) -> f64 {
        self.delay
    }

    /// 根据最新的偏差更新并返回下一帧之前的休眠时长（秒）
    pub fn next_delay(&mut self, time_diff: f64) -> f64 {
        let default = self.default_delay;

        if time_diff.abs() > SYNC_THRESHOLD {
            if time_diff > SYNC_THRESHOLD {
                self.delay = self.delay * 2.0 / 3.0;
            } else {
                self.delay = self.delay * 3.0 / 2.0;
            }

            if self.delay < default / 2.0 {
                self.delay = default * 2.0 / 3.0;
            } else if self.delay > default * 2.0 {
                self.delay = default * 1.5;
            }
        }

        if time_diff >= LARGE_DRIFT {
            self.delay = 0.0;
        } else if time_diff <= -LARGE_DRIFT {
            self.delay = default * 2.0;
        }

        self.delay
    }
}
