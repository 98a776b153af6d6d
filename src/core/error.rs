use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpeg(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无法打开数据源: {0}")]
    OpenError(String),

    #[error("Cannot find or prepare audio")]
    NoAudioStream,

    #[error("找不到解码器: {0}")]
    CodecNotFound(String),

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("重采样错误: {0}")]
    ResampleError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("非法操作: {0}")]
    InvalidState(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl PlayerError {
    /// 回调给外部的错误码：FFmpeg 错误保留 AVERROR 原值，其余统一为 -1
    pub fn code(&self) -> i32 {
        match self {
            PlayerError::FFmpeg(e) => i32::from(*e),
            _ => -1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_errors_keep_their_averror_code() {
        let err = PlayerError::from(ffmpeg_next::Error::Eof);
        assert_eq!(err.code(), i32::from(ffmpeg_next::Error::Eof));
        assert!(err.code() < 0);
    }

    #[test]
    fn other_errors_map_to_minus_one() {
        assert_eq!(PlayerError::NoAudioStream.code(), -1);
        assert_eq!(PlayerError::Config("x".into()).code(), -1);
        assert_eq!(
            PlayerError::NoAudioStream.to_string(),
            "Cannot find or prepare audio"
        );
    }
}
