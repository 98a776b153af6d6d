use crate::core::{MediaInfo, PlayerError, Result, StreamInfo, AV_TIME_BASE};
use crate::player::decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
use crate::player::demuxer_source::{AudioDecode, DemuxerSource, ReadOutcome, VideoDecode};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// 解封装器 - 负责打开容器并按流读取压缩包
pub struct Demuxer {
    input_ctx: format::context::Input,
    media_info: MediaInfo, // 缓存媒体信息
    source_path: String,   // 媒体源路径（用于描述）
}

impl Demuxer {
    /// 打开媒体资源
    ///
    /// 缺少音频流不在这里判断：是否允许播放由上层的 prepare 决定
    pub fn open(uri: &str) -> Result<Self> {
        info!("正在打开数据源: {}", uri);

        let input_ctx = format::input(&uri).map_err(|e| {
            PlayerError::OpenError(format!(
                "Open data source failed, the data source is: {} ({})",
                uri, e
            ))
        })?;

        let audio = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| Self::stream_info(&s));

        let video = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| Self::stream_info(&s));

        // 容器时长为 AV_TIME_BASE（微秒）单位，未知时为负数
        let duration = if input_ctx.duration() > 0 {
            input_ctx.duration() as f64 / AV_TIME_BASE as f64
        } else {
            0.0
        };

        debug!("音频流: {:?}", audio);
        debug!("视频流: {:?}", video);
        info!("📎 总时长: {:.3}s", duration);

        Ok(Self {
            input_ctx,
            media_info: MediaInfo {
                duration,
                audio,
                video,
            },
            source_path: uri.to_string(),
        })
    }

    fn stream_info(stream: &format::stream::Stream) -> StreamInfo {
        let tb = stream.time_base();
        let time_base = if tb.denominator() != 0 {
            tb.numerator() as f64 / tb.denominator() as f64
        } else {
            0.0
        };
        let fps = stream.avg_frame_rate();
        StreamInfo {
            index: stream.index(),
            time_base,
            frame_rate: (fps.numerator(), fps.denominator()),
        }
    }

    fn stream(&self, info: Option<StreamInfo>) -> Option<format::stream::Stream<'_>> {
        info.and_then(|s| self.input_ctx.stream(s.index))
    }
}

impl DemuxerSource for Demuxer {
    fn read_packet(&mut self) -> Result<ReadOutcome> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input_ctx) {
            Ok(()) => Ok(ReadOutcome::Packet(packet)),
            Err(ffmpeg::Error::Eof) => Ok(ReadOutcome::EndOfStream),
            Err(e) => Err(e.into()),
        }
    }

    fn seek(&mut self, timestamp_us: i64) -> Result<()> {
        self.input_ctx.seek(timestamp_us, ..timestamp_us)?;
        Ok(())
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn open_audio_decoder(&self) -> Result<Box<dyn AudioDecode>> {
        let stream = self
            .stream(self.media_info.audio)
            .ok_or(PlayerError::NoAudioStream)?;
        Ok(Box::new(FfmpegAudioDecoder::from_stream(stream)?))
    }

    fn open_video_decoder(&self) -> Result<Box<dyn VideoDecode>> {
        let stream = self
            .stream(self.media_info.video)
            .ok_or_else(|| PlayerError::Other("无法找到视频流".to_string()))?;
        Ok(Box::new(FfmpegVideoDecoder::from_stream(stream)?))
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
