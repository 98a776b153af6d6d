// 播放器核心模块

pub mod audio_output;
pub mod audio_track;
pub mod decoder;
pub mod demuxer;
pub mod demuxer_source; // Demuxer 抽象接口
pub mod demuxer_thread; // 解封装线程
pub mod listener;
pub mod manager;
pub mod packet_queue;
pub mod stream;
pub mod sync;
pub mod time_stretch;
pub mod video_track;

pub use audio_output::{AudioSink, CpalAudioSink, OutputControls};
pub use audio_track::{AudioTrack, SinkFactory, StretchFactory};
pub use decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
pub use demuxer::Demuxer;
pub use demuxer_source::{AudioDecode, DemuxerSource, ReadOutcome, VideoDecode};
pub use listener::{ChannelListener, PlayerEvent, PlayerListener};
pub use manager::{Backends, MediaPlayer};
pub use packet_queue::{PacketQueue, MAX_QUEUE_CACHE_SIZE};
pub use stream::{MediaTrack, StreamCore, Worker};
pub use sync::SyncController;
pub use time_stretch::{FilterTimeStretch, StretchParams, TimeStretch};
pub use video_track::VideoTrack;
