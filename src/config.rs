use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen: String,
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,

    /// 运行时数据目录：实时消息文件、文字样式、循环播放列表
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// 本地循环推流可选的视频目录
    #[serde(default = "default_videos_dir")]
    pub videos_dir: PathBuf,

    /// 上传的台标存放目录
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// 替换音轨 (useMp3Audio 时作为第一路输入)
    #[serde(default = "default_audio_track")]
    pub audio_track: PathBuf,

    /// 指定字体文件，留空时按平台自动查找
    #[serde(default)]
    pub font_file: Option<PathBuf>,
}

/// 输出编码参数，全部可在配置中覆盖
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    pub video_codec: String,
    pub preset: String,
    pub gop: u32,
    pub video_bitrate: String,
    pub maxrate: String,
    pub bufsize: String,
    pub pix_fmt: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_channels: u32,
    pub audio_rate: u32,
    pub format: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            gop: 60,
            video_bitrate: "4000k".to_string(),
            maxrate: "4500k".to_string(),
            bufsize: "8000k".to_string(),
            pix_fmt: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_channels: 2,
            audio_rate: 44100,
            format: "flv".to_string(),
        }
    }
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_videos_dir() -> PathBuf {
    PathBuf::from("./videos")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_audio_track() -> PathBuf {
    PathBuf::from("./media/sound.mp3")
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// 以给定目录为根的默认配置，测试中使用
    #[cfg(test)]
    pub fn for_root(root: &Path) -> Self {
        Self {
            server: ServerConfig {
                listen: "127.0.0.1:0".to_string(),
                ffmpeg_binary: default_ffmpeg_binary(),
                data_dir: root.join("data"),
                videos_dir: root.join("videos"),
                uploads_dir: root.join("uploads"),
                audio_track: root.join("media").join("sound.mp3"),
                font_file: None,
            },
            encoder: EncoderConfig::default(),
        }
    }
}
