use crate::core::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 播放器配置（队列容量、轮询间隔、超时）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 每条流的包队列容量
    pub queue_capacity: usize,
    /// seeking 期间消费线程 / 解封装线程的重试间隔
    pub seek_retry_interval_ms: u64,
    /// EOF 之后等待音频队列排空的轮询间隔
    pub drain_poll_interval_ms: u64,
    /// 非 EOF 读包错误后的退避时长
    pub read_error_backoff_ms: u64,
    /// 帧率不可用时的默认帧间隔（秒）
    pub fallback_frame_delay_secs: f64,
    /// 写入音频设备时单次等待的上限
    pub sink_write_timeout_ms: u64,
    /// stop() 等待工作线程超过该时长时打印告警
    pub worker_join_warn_ms: u64,
    /// 初始音量 [0, 100]
    pub default_volume: u8,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            seek_retry_interval_ms: 100,
            drain_poll_interval_ms: 100,
            read_error_backoff_ms: 100,
            fallback_frame_delay_secs: 0.04,
            sink_write_timeout_ms: 100,
            worker_join_warn_ms: 2000,
            default_volume: 50,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 字符串解析（缺省字段使用默认值）
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PlayerError::Config(format!("解析配置失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(PlayerError::Config("queue_capacity 必须大于 0".to_string()));
        }
        if !(self.fallback_frame_delay_secs > 0.0 && self.fallback_frame_delay_secs.is_finite()) {
            return Err(PlayerError::Config(format!(
                "fallback_frame_delay_secs 非法: {}",
                self.fallback_frame_delay_secs
            )));
        }
        if self.default_volume > 100 {
            return Err(PlayerError::Config(format!(
                "default_volume 超出 [0, 100]: {}",
                self.default_volume
            )));
        }
        Ok(())
    }

    pub fn seek_retry_interval(&self) -> Duration {
        Duration::from_millis(self.seek_retry_interval_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn read_error_backoff(&self) -> Duration {
        Duration::from_millis(self.read_error_backoff_ms)
    }

    pub fn sink_write_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_write_timeout_ms)
    }

    pub fn worker_join_warn(&self) -> Duration {
        Duration::from_millis(self.worker_join_warn_ms)
    }
}
