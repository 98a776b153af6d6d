use crate::core::{MediaInfo, PcmFrame, Result, YuvFrame};
use ffmpeg_next::Packet;

/// 读包结果
pub enum ReadOutcome {
    /// 成功读取一个压缩包（携带 stream index 和 pts）
    Packet(Packet),
    /// 到达文件末尾
    EndOfStream,
}

/// Demuxer 数据源抽象接口
///
/// 不同的实现（FFmpeg 容器、内存源等）只需要提供读包、seek 和解码器的创建。
/// 调用方保证同一时刻只有一个线程访问（格式上下文锁）。
pub trait DemuxerSource: Send {
    /// 读取下一个压缩包
    ///
    /// 返回：
    /// - Ok(Packet): 成功读取一个包
    /// - Ok(EndOfStream): 到达文件末尾
    /// - Err(e): 非致命读取错误，调用方记录后重试
    fn read_packet(&mut self) -> Result<ReadOutcome>;

    /// Seek 到指定位置（微秒，AV_TIME_BASE）
    fn seek(&mut self, timestamp_us: i64) -> Result<()>;

    /// 媒体信息（总时长 + 最佳音频 / 视频流）
    fn media_info(&self) -> &MediaInfo;

    /// 为最佳音频流打开解码器，输出固定目标格式的 PCM
    fn open_audio_decoder(&self) -> Result<Box<dyn AudioDecode>>;

    /// 为最佳视频流打开解码器，输出 YUV420P
    fn open_video_decoder(&self) -> Result<Box<dyn VideoDecode>>;

    /// 获取描述信息（用于日志）
    fn description(&self) -> String;
}

/// 音频解码器：解码 + 重采样为 44100Hz / 立体声 / s16
pub trait AudioDecode: Send {
    /// 送入一个包，取出 0~n 帧
    fn decode(&mut self, packet: &Packet) -> Result<Vec<PcmFrame>>;

    /// 清空解码器内部缓冲（seek 时调用）
    fn flush(&mut self);
}

/// 视频解码器：解码 + 转换为 YUV420P
pub trait VideoDecode: Send {
    /// 送入一个包，取出 0~n 帧
    fn decode(&mut self, packet: &Packet) -> Result<Vec<YuvFrame>>;

    /// 清空解码器内部缓冲（seek 时调用）
    fn flush(&mut self);
}
