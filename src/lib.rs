//! 音频主时钟同步的音视频播放核心
//!
//! 一个解封装线程按流分发压缩包，音频线程解码 / 重采样 / 变速变调后写入输出设备并维护主时钟，
//! 视频线程解码为 YUV420P 并对照音频时钟控制出帧节奏。

pub mod core;
pub mod player;

pub use crate::core::{ChannelLayout, PlayerConfig, PlayerError, PlayerPhase, Result};
pub use crate::player::{MediaPlayer, PlayerEvent, PlayerListener};
