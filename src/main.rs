use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};
use smedia_player::player::{ChannelListener, PlayerEvent};
use smedia_player::{MediaPlayer, PlayerConfig};
use std::sync::Arc;
use std::time::Duration;

fn load_config() -> Result<PlayerConfig> {
    match std::env::var("SMEDIA_PLAYER_CONFIG") {
        Ok(path) => {
            info!("📄 加载配置: {}", path);
            PlayerConfig::load(&path).with_context(|| format!("加载配置失败: {}", path))
        }
        Err(_) => Ok(PlayerConfig::default()),
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let uri = std::env::args()
        .nth(1)
        .context("用法: smedia-player <媒体文件或 URL>")?;

    info!("🎬 SMedia Player 启动");

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let config = load_config()?;
    let (listener, events) = ChannelListener::unbounded();
    let mut player = MediaPlayer::new(config, Arc::new(listener))?;

    player.set_data_source(uri.as_str());
    player.prepare()?;
    player.play()?;

    loop {
        match events.recv_timeout(Duration::from_secs(1)) {
            Ok(PlayerEvent::Completed) => {
                info!("🏁 播放完成");
                break;
            }
            Ok(PlayerEvent::Error { code, message }) => {
                warn!("❌ 播放错误 ({}): {}", code, message);
                break;
            }
            Ok(PlayerEvent::Progress { current, total }) => {
                info!("⏱ {}s / {}s", current, total);
            }
            Ok(PlayerEvent::RenderYuv { .. }) | Ok(PlayerEvent::VolumeDb { .. }) => {}
            Ok(event) => info!("📣 {:?}", event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    player.stop();
    Ok(())
}
