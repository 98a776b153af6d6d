use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 播放状态标志 - 被解封装线程和音视频消费线程共享
///
/// - `playing`: 从首次 play() 到 stop() 之间为 true
/// - `pausing`: pause() 与 resume() 之间为 true
/// - `seeking`: 仅在 seek 执行期间为 true
/// - `completed`: 解封装线程上报 completed 之后为 true
///
/// 每一个阻塞点都有对应的唤醒路径：暂停等待由 resume()/stop() 唤醒，
/// park() 的定时休眠由 stop() 提前唤醒。
#[derive(Debug, Default)]
pub struct PlaybackState {
    playing: AtomicBool,
    pausing: AtomicBool,
    seeking: AtomicBool,
    completed: AtomicBool,
    pause_lock: Mutex<()>,
    pause_cond: Condvar,
    park_lock: Mutex<()>,
    park_cond: Condvar,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_pausing(&self) -> bool {
        self.pausing.load(Ordering::Acquire)
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    /// 进入播放状态，返回 false 表示已经在播放
    pub fn start_playing(&self) -> bool {
        !self.playing.swap(true, Ordering::AcqRel)
    }

    /// 置为暂停，返回 false 表示已经暂停
    pub fn set_pausing(&self) -> bool {
        let _guard = self.pause_lock.lock();
        !self.pausing.swap(true, Ordering::AcqRel)
    }

    /// 解除暂停并唤醒所有暂停等待者，返回 false 表示本来就没有暂停
    pub fn clear_pausing(&self) -> bool {
        let _guard = self.pause_lock.lock();
        let was_pausing = self.pausing.swap(false, Ordering::AcqRel);
        self.pause_cond.notify_all();
        was_pausing
    }

    pub fn set_seeking(&self, seeking: bool) {
        self.seeking.store(seeking, Ordering::Release);
    }

    /// 停止：清除 playing / pausing，唤醒所有暂停等待和 park 休眠
    pub fn stop(&self) {
        {
            let _guard = self.pause_lock.lock();
            self.playing.store(false, Ordering::Release);
            self.pausing.store(false, Ordering::Release);
            self.pause_cond.notify_all();
        }
        let _guard = self.park_lock.lock();
        self.park_cond.notify_all();
    }

    /// 暂停时阻塞当前线程，直到 resume() 或 stop()
    ///
    /// 返回 true 表示确实等待过
    pub fn wait_while_paused(&self) -> bool {
        let mut guard = self.pause_lock.lock();
        let mut waited = false;
        while self.pausing.load(Ordering::Acquire) && self.playing.load(Ordering::Acquire) {
            waited = true;
            self.pause_cond.wait(&mut guard);
        }
        waited
    }

    /// 可被 stop() 打断的定时休眠（seek 重试 / EOF 排空轮询 / 同步延时）
    pub fn park(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let mut guard = self.park_lock.lock();
        if !self.playing.load(Ordering::Acquire) {
            return;
        }
        self.park_cond.wait_for(&mut guard, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn play_and_pause_are_idempotent() {
        let state = PlaybackState::new();
        assert!(state.start_playing());
        assert!(!state.start_playing());

        assert!(state.set_pausing());
        assert!(!state.set_pausing());
        assert!(state.clear_pausing());
        assert!(!state.clear_pausing());
    }

    #[test]
    fn completion_is_sticky() {
        let state = PlaybackState::new();
        state.start_playing();
        assert!(!state.is_completed());
        state.mark_completed();
        state.set_pausing();
        state.clear_pausing();
        assert!(state.is_completed());
    }

    #[test]
    fn resume_wakes_paused_thread() {
        let state = Arc::new(PlaybackState::new());
        state.start_playing();
        state.set_pausing();

        let waiter = {
            let state = state.clone();
            thread::spawn(move || state.wait_while_paused())
        };
        thread::sleep(Duration::from_millis(50));
        state.clear_pausing();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn stop_wakes_paused_thread() {
        let state = Arc::new(PlaybackState::new());
        state.start_playing();
        state.set_pausing();

        let waiter = {
            let state = state.clone();
            thread::spawn(move || state.wait_while_paused())
        };
        thread::sleep(Duration::from_millis(50));
        state.stop();
        waiter.join().unwrap();
        assert!(!state.is_playing());
        assert!(!state.is_pausing());
    }

    #[test]
    fn stop_interrupts_park() {
        let state = Arc::new(PlaybackState::new());
        state.start_playing();

        let sleeper = {
            let state = state.clone();
            thread::spawn(move || {
                let start = Instant::now();
                state.park(Duration::from_secs(10));
                start.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(50));
        state.stop();
        assert!(sleeper.join().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn park_returns_immediately_when_not_playing() {
        let state = PlaybackState::new();
        let start = Instant::now();
        state.park(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
