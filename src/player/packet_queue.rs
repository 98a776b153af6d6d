use crate::core::PlaybackState;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// 队列的默认最大缓存数量
pub const MAX_QUEUE_CACHE_SIZE: usize = 100;

/// 单次条件等待的上限，醒来后重新检查 playing
const WAIT_SLICE: Duration = Duration::from_millis(100);

struct QueueInner<T> {
    items: VecDeque<T>,
    /// notify_all() 的代数，用于让阻塞的 pop 感知“强制唤醒”
    wake_generation: u64,
}

/// 有界包队列 - 每条基本流一个实例
///
/// - push(): playing 且已满时阻塞，size 始终不超过 capacity
/// - pop(): playing 且为空时阻塞；被 notify_all() 或 stop 唤醒后可能返回 None
/// - playing 变为 false 后，阻塞中的 push / pop 最多 WAIT_SLICE 内返回
/// - 所有操作共用同一把锁，音频 / 视频队列之间没有交叉加锁
pub struct PacketQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    state: Arc<PlaybackState>,
}

impl<T> PacketQueue<T> {
    pub fn new(capacity: usize, state: Arc<PlaybackState>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                wake_generation: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            state,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 入队（解封装线程调用）
    ///
    /// notify_all() 不会让生产者越过容量上限，只有 pop / clear 或 playing 变为 false 才能放行
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        while self.state.is_playing() && inner.items.len() >= self.capacity {
            self.not_full.wait_for(&mut inner, WAIT_SLICE);
        }
        inner.items.push_back(item);
        self.not_empty.notify_one();
    }

    /// 出队（音视频消费线程调用）
    ///
    /// 返回 None 表示队列已被清空 / 被强制唤醒，调用方应稍后重试，而不是当作错误
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let generation = inner.wake_generation;
        while self.state.is_playing()
            && inner.items.is_empty()
            && inner.wake_generation == generation
        {
            self.not_empty.wait_for(&mut inner, WAIT_SLICE);
        }
        let item = inner.items.pop_front();
        self.not_full.notify_one();
        item
    }

    /// 清空队列并释放所有包，唤醒被阻塞的生产者
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let cleared = inner.items.len();
        inner.items.clear();
        self.not_full.notify_all();
        cleared
    }

    /// 获取队列中的数据量
    pub fn size(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 强制唤醒所有生产者和消费者，不改变队列内容
    pub fn notify_all(&self) {
        let mut inner = self.inner.lock();
        inner.wake_generation = inner.wake_generation.wrapping_add(1);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}
