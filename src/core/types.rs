use serde::{Deserialize, Serialize};

/// 重采样后的目标 PCM 格式：44100Hz / 立体声 / 16bit
pub const TARGET_SAMPLE_RATE: u32 = 44100;
pub const TARGET_CHANNELS: u16 = 2;
pub const TARGET_BYTES_PER_SAMPLE: usize = 2;

/// 容器时间单位（微秒）
pub const AV_TIME_BASE: i64 = 1_000_000;

/// 播放会话的生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerPhase {
    Idle,
    Prepared,
    Playing,
    Paused,
    /// 音频已全部播放完，会话仍然保留直到 stop()/next()
    Completed,
    Stopped,
}

/// 声道控制（数值与外部控制器保持一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Right = 0,
    Left = 1,
    Stereo = 2,
}

impl ChannelLayout {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChannelLayout::Right,
            1 => ChannelLayout::Left,
            _ => ChannelLayout::Stereo,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// 是否需要静音第 `channel` 个声道（0 = 左, 1 = 右）
    pub fn is_muted(self, channel: usize) -> bool {
        match self {
            ChannelLayout::Right => channel == 0,
            ChannelLayout::Left => channel == 1,
            ChannelLayout::Stereo => false,
        }
    }
}

/// 单条基本流的描述
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    /// 时间基（秒 / 单位）
    pub time_base: f64,
    /// 平均帧率 (num, den)，音频流为 (0, 0)
    pub frame_rate: (i32, i32),
}

/// 媒体信息
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// 总时长（秒）
    pub duration: f64,
    pub audio: Option<StreamInfo>,
    pub video: Option<StreamInfo>,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            audio: None,
            video: None,
        }
    }
}

/// 解码 + 重采样后的一帧 PCM（交错 s16）
#[derive(Debug, Clone, Default)]
pub struct PcmFrame {
    /// best-effort 时间戳（流时间单位）
    pub pts: Option<i64>,
    /// 每个声道的采样点数
    pub nb_samples: usize,
    pub samples: Vec<i16>,
}

/// 转换为 YUV420P 的一帧视频，三个平面均为紧凑存储（无行对齐填充）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YuvFrame {
    pub pts: Option<i64>,
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl YuvFrame {
    /// 4:2:0 色度平面的宽高
    pub fn chroma_size(width: u32, height: u32) -> (usize, usize) {
        (((width + 1) / 2) as usize, ((height + 1) / 2) as usize)
    }
}
