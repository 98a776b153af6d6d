use crate::core::{
    PcmFrame, PlayerError, Result, YuvFrame, TARGET_BYTES_PER_SAMPLE, TARGET_CHANNELS,
    TARGET_SAMPLE_RATE,
};
use crate::player::demuxer_source::{AudioDecode, VideoDecode};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, warn};

/// 根据流参数查找并打开解码器上下文
fn open_context(stream: &format::stream::Stream) -> Result<codec::context::Context> {
    let params = stream.parameters();
    let codec_id = params.id();
    if codec::decoder::find(codec_id).is_none() {
        return Err(PlayerError::CodecNotFound(format!("{:?}", codec_id)));
    }
    Ok(codec::context::Context::from_parameters(params)?)
}

/// 音频解码器（解码 + 重采样为 44100Hz / 立体声 / s16）
pub struct FfmpegAudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
}

// SwrContext 本身不是 Send，但每个解码器实例只会在持有解码器锁的线程中使用
unsafe impl Send for FfmpegAudioDecoder {}

impl FfmpegAudioDecoder {
    /// 从音频流创建解码器
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let decoder = open_context(&stream)?.decoder().audio()?;

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?} → 目标: {} Hz, {} 声道, s16",
            decoder.rate(),
            decoder.channels(),
            decoder.format(),
            TARGET_SAMPLE_RATE,
            TARGET_CHANNELS
        );

        Ok(Self {
            decoder,
            resampler: None,
        })
    }

    /// 重采样为固定的目标格式
    fn resample(&mut self, mut frame: util::frame::Audio) -> Result<PcmFrame> {
        // 部分编码器不填声道布局，按声道数补上默认布局
        if frame.channel_layout().is_empty() {
            frame.set_channel_layout(ChannelLayout::default(frame.channels() as i32));
        }

        if self.resampler.is_none() {
            debug!(
                "🔧 初始化音频重采样器: {}Hz/{}ch/{:?} → {}Hz/{}ch/s16",
                frame.rate(),
                frame.channels(),
                frame.format(),
                TARGET_SAMPLE_RATE,
                TARGET_CHANNELS
            );
            let resampler = software::resampling::Context::get(
                frame.format(),
                frame.channel_layout(),
                frame.rate(),
                util::format::Sample::I16(util::format::sample::Type::Packed),
                ChannelLayout::STEREO,
                TARGET_SAMPLE_RATE,
            )
            .map_err(|e| PlayerError::ResampleError(format!("create swr_context failed: {}", e)))?;
            self.resampler = Some(resampler);
        }

        let resampler = self
            .resampler
            .as_mut()
            .ok_or_else(|| PlayerError::ResampleError("重采样器未初始化".to_string()))?;

        let mut resampled = util::frame::Audio::empty();
        resampler
            .run(&frame, &mut resampled)
            .map_err(|e| PlayerError::ResampleError(e.to_string()))?;

        let nb_samples = resampled.samples();
        if nb_samples == 0 {
            return Ok(PcmFrame {
                pts: frame.timestamp(),
                nb_samples: 0,
                samples: Vec::new(),
            });
        }

        // 只读取 nb_samples * channels 个采样点，平面缓冲区可能带有对齐填充
        let byte_len = nb_samples * TARGET_CHANNELS as usize * TARGET_BYTES_PER_SAMPLE;
        let samples = resampled.data(0)[..byte_len]
            .chunks_exact(TARGET_BYTES_PER_SAMPLE)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect();

        Ok(PcmFrame {
            pts: frame.timestamp(),
            nb_samples,
            samples,
        })
    }
}

impl AudioDecode for FfmpegAudioDecoder {
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<PcmFrame>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("音频解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                self.decoder.flush();
                return Ok(frames);
            }
            Err(e) => return Err(e.into()),
        }

        loop {
            let mut decoded_frame = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(()) => frames.push(self.resample(decoded_frame)?),
                Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(frames)
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}

/// 视频解码器（解码 + 转换为紧凑的 YUV420P）
pub struct FfmpegVideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    scaler_key: Option<(util::format::Pixel, u32, u32)>,
}

// SwsContext 本身不是 Send，但我们确保只在单个线程中使用它
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    /// 从视频流创建解码器
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let decoder = open_context(&stream)?.decoder().video()?;

        debug!(
            "视频解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            decoder,
            scaler: None,
            scaler_key: None,
        })
    }

    /// 转为标准的 YUV420P，防止 NV12/NV21 被误识别导致花屏
    fn convert_frame(&mut self, frame: util::frame::Video) -> Result<YuvFrame> {
        let width = frame.width();
        let height = frame.height();
        let pts = frame.timestamp();

        let yuv = if frame.format() == util::format::Pixel::YUV420P {
            frame
        } else {
            let key = (frame.format(), width, height);
            if self.scaler_key != Some(key) {
                self.scaler = Some(software::scaling::Context::get(
                    frame.format(),
                    width,
                    height,
                    util::format::Pixel::YUV420P,
                    width,
                    height,
                    software::scaling::Flags::BICUBIC,
                )?);
                self.scaler_key = Some(key);
            }
            let scaler = self
                .scaler
                .as_mut()
                .ok_or_else(|| PlayerError::DecodeError("缩放器未初始化".to_string()))?;
            let mut converted = util::frame::Video::empty();
            scaler.run(&frame, &mut converted)?;
            converted
        };

        let (chroma_w, chroma_h) = YuvFrame::chroma_size(width, height);
        Ok(YuvFrame {
            pts,
            width,
            height,
            y: copy_plane(&yuv, 0, width as usize, height as usize),
            u: copy_plane(&yuv, 1, chroma_w, chroma_h),
            v: copy_plane(&yuv, 2, chroma_w, chroma_h),
        })
    }
}

/// 按行拷贝一个平面，去掉 stride 填充
fn copy_plane(frame: &util::frame::Video, index: usize, width: usize, height: usize) -> Vec<u8> {
    let stride = frame.stride(index);
    let src = frame.data(index);
    let mut plane = vec![0u8; width * height];
    for row in 0..height {
        let src_offset = row * stride;
        let dst_offset = row * width;
        plane[dst_offset..dst_offset + width].copy_from_slice(&src[src_offset..src_offset + width]);
    }
    plane
}

impl VideoDecode for FfmpegVideoDecoder {
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<YuvFrame>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                self.decoder.flush();
                return Ok(frames);
            }
            Err(e) => return Err(e.into()),
        }

        loop {
            let mut decoded_frame = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(()) => frames.push(self.convert_frame(decoded_frame)?),
                Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("视频解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }

        Ok(frames)
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}
