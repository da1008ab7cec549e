use crate::error::{StreamError, StreamResult};
use crate::font::resolve_font;
use crate::graph::{build_pipeline, LogoOverlay, PipelinePlan, PrimarySource, TextStage};
use crate::request::{SourceSelection, StreamRequest, ValidatedRequest};
use crate::state::AppState;
use crate::storage::write_atomic;
use crate::supervisor::StreamStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// concat 列表重复次数，避免长时间推流时列表播完
const CONCAT_REPEAT: usize = 10;

/// 生成 concat 列表内容：整个选择按顺序重复 [`CONCAT_REPEAT`] 次
pub fn concat_list(files: &[PathBuf]) -> String {
    let entries: Vec<String> = files
        .iter()
        .map(|f| format!("file '{}'", f.to_string_lossy().replace('\'', "'\\''")))
        .collect();
    let mut content = Vec::with_capacity(entries.len() * CONCAT_REPEAT);
    for _ in 0..CONCAT_REPEAT {
        content.extend(entries.iter().cloned());
    }
    content.join("\n")
}

/// 解析本地循环文件
///
/// concat 列表中的相对路径按列表文件所在目录解析，因此这里统一转成绝对路径。
pub fn local_entries(videos_dir: &Path, names: &[String]) -> StreamResult<Vec<PathBuf>> {
    names
        .iter()
        .map(|name| existing(videos_dir.join(name)).map(|p| absolute(&p)))
        .collect()
}

fn existing(path: PathBuf) -> StreamResult<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(StreamError::AssetMissing(path))
    }
}

pub struct Engine;

impl Engine {
    /// 可用内存低于该值 (KB) 时拒绝启动
    const MIN_AVAILABLE_MEMORY_KB: u64 = 5120;

    fn check_memory() -> StreamResult<()> {
        match sys_info::mem_info() {
            Ok(mem) if mem.avail < Self::MIN_AVAILABLE_MEMORY_KB => {
                Err(StreamError::InsufficientMemory(mem.avail))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                // 无法获取内存信息时仅记录警告而不阻断流程
                warn!("Failed to check memory usage: {}", e);
                Ok(())
            }
        }
    }

    async fn primary_source(state: &AppState, source: &SourceSelection) -> StreamResult<PrimarySource> {
        match source {
            SourceSelection::Remote(url) => Ok(PrimarySource::Url(url.clone())),
            SourceSelection::LocalFiles(names) => {
                let files = local_entries(&state.config.server.videos_dir, names)?;

                let list = state.config.server.data_dir.join("concat.txt");
                write_atomic(&list, concat_list(&files).as_bytes()).await?;
                Ok(PrimarySource::ConcatList(list))
            }
        }
    }

    async fn plan(state: &AppState, request: &ValidatedRequest) -> StreamResult<PipelinePlan> {
        let server = &state.config.server;

        let font_file = resolve_font(server.font_file.as_deref())?;
        let audio_track = if request.use_audio_track {
            Some(existing(server.audio_track.clone())?)
        } else {
            None
        };
        let logo = match &request.logo {
            Some((name, position)) => Some(LogoOverlay {
                path: existing(server.uploads_dir.join(name))?,
                position: *position,
            }),
            None => None,
        };
        let source = Self::primary_source(state, &request.source).await?;
        let style = state.styles.read().await;

        Ok(PipelinePlan {
            source,
            destination: request.destination.clone(),
            audio_track,
            zoom: request.zoom,
            blur: request.blur,
            logo,
            text: TextStage {
                message_file: absolute(state.messages.path()),
                font_file,
                style,
            },
            encoder: state.config.encoder.clone(),
        })
    }

    /// 开始推流
    ///
    /// # 副作用
    /// - 写入 concat 列表 (本地循环模式)
    /// - 清空实时消息
    /// - 启动转码子进程
    ///
    /// # 错误处理
    /// - 参数校验失败时不产生任何副作用
    /// - 已在推流时返回 AlreadyRunning
    /// - 字体、音轨、台标缺失或进程启动失败时返回错误，不持有进程
    pub async fn start_stream(state: &Arc<AppState>, request: &StreamRequest) -> StreamResult<StreamStatus> {
        // 1. 校验请求
        let request = request.validate()?;

        // 2. 串行化所有启停操作，检查与启动之间不会插入其他控制请求
        let _control = state.control.lock().await;
        if state.supervisor.is_running() {
            return Err(StreamError::AlreadyRunning);
        }

        // 3. 检查系统内存是否足够
        Self::check_memory()?;

        // 4. 解析输入、字体与样式
        let plan = Self::plan(state, &request).await?;

        // 5. 清空上一次推流留下的消息
        state.messages.reset().await?;

        // 6. 构建命令并启动
        let spec = build_pipeline(&state.config.server.ffmpeg_binary, &plan);
        info!("Starting stream to: {}", spec.destination);
        info!("FFmpeg command: {}", spec.command_line());

        state.supervisor.start(&spec)
    }

    /// 停止推流
    ///
    /// # 错误处理
    /// - 没有推流时返回 NotRunning
    pub async fn stop_stream(state: &Arc<AppState>) -> StreamResult<()> {
        let _control = state.control.lock().await;
        state.supervisor.stop()
    }
}

/// 滤镜中的文件路径需要是绝对路径，转码器的工作目录未必与服务一致
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::tempdir;

    #[test]
    fn concat_list_repeats_selection() {
        let files = vec![PathBuf::from("/v/a.mp4"), PathBuf::from("/v/b.mp4")];
        let content = concat_list(&files);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2 * CONCAT_REPEAT);
        assert_eq!(lines[0], "file '/v/a.mp4'");
        assert_eq!(lines[1], "file '/v/b.mp4'");
        assert_eq!(lines[2], "file '/v/a.mp4'");
    }

    #[test]
    fn concat_list_escapes_quotes() {
        let content = concat_list(&[PathBuf::from("/v/it's.mp4")]);
        assert!(content.starts_with("file '/v/it'\\''s.mp4'"));
    }

    #[test]
    fn local_entries_are_absolute_for_relative_videos_dir() {
        // 在当前工作目录下建目录，得到一个真实存在的相对路径
        let dir = tempfile::Builder::new()
            .prefix("videos-")
            .tempdir_in(".")
            .unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"").unwrap();
        let relative = PathBuf::from(dir.path().file_name().unwrap());
        assert!(relative.is_relative());

        let entries = local_entries(&relative, &["a.mp4".to_string()]).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_absolute());
        assert!(entries[0].is_file());

        let list = concat_list(&entries);
        let line = list.lines().next().unwrap();
        let quoted = line.strip_prefix("file '").unwrap();
        assert!(Path::new(quoted).is_absolute());
        assert!(!line.contains("file './"));
    }

    #[test]
    fn local_entries_reject_missing_files() {
        let dir = tempdir().unwrap();
        let err = local_entries(dir.path(), &["gone.mp4".to_string()]).unwrap_err();
        assert!(matches!(err, StreamError::AssetMissing(_)));
    }

    fn state(root: &Path) -> Arc<AppState> {
        Arc::new(AppState::new(AppConfig::for_root(root)))
    }

    #[tokio::test]
    async fn invalid_request_spawns_nothing() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        let request = StreamRequest {
            rtmp_url: "rtmp://live.twitch.tv/app".into(),
            ..Default::default()
        };

        let err = Engine::start_stream(&state, &request).await.unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
        assert!(!state.supervisor.is_running());
        assert!(!state.messages.path().exists());
    }

    #[tokio::test]
    async fn missing_local_video_is_reported() {
        let dir = tempdir().unwrap();
        let font = dir.path().join("font.ttf");
        std::fs::write(&font, b"font").unwrap();
        let mut config = AppConfig::for_root(dir.path());
        config.server.font_file = Some(font);
        let state = Arc::new(AppState::new(config));

        let request: StreamRequest = serde_json::from_str(
            r#"{"rtmpUrl":"rtmp://a.b/app","streamKey":"k",
                "inputSource":{"kind":"local-files","files":["missing.mp4"]}}"#,
        )
        .unwrap();

        let err = Engine::start_stream(&state, &request).await.unwrap_err();
        assert!(matches!(err, StreamError::AssetMissing(_)));
        assert!(!state.supervisor.is_running());
    }

    #[tokio::test]
    async fn stop_without_stream_is_rejected() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        assert!(matches!(
            Engine::stop_stream(&state).await,
            Err(StreamError::NotRunning)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_writes_concat_list_and_clears_messages() {
        let dir = tempdir().unwrap();
        let font = dir.path().join("font.ttf");
        std::fs::write(&font, b"font").unwrap();
        std::fs::create_dir_all(dir.path().join("videos")).unwrap();
        std::fs::write(dir.path().join("videos").join("a.mp4"), b"").unwrap();

        let mut config = AppConfig::for_root(dir.path());
        config.server.font_file = Some(font);
        // 任意参数都会让 sleep 立即报错退出，这里只关心启动流程本身
        config.server.ffmpeg_binary = "sleep".to_string();
        let state = Arc::new(AppState::new(config));
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(state.messages.path(), "old message\n").unwrap();

        let request: StreamRequest = serde_json::from_str(
            r#"{"rtmpUrl":"rtmp://live.twitch.tv/app","streamKey":"/k/",
                "inputSource":{"kind":"local-files","files":["a.mp4"]}}"#,
        )
        .unwrap();

        let status = Engine::start_stream(&state, &request).await.unwrap();
        assert!(status.is_streaming);
        assert_eq!(status.platform_label.as_deref(), Some("Twitch"));

        let list = std::fs::read_to_string(dir.path().join("data").join("concat.txt")).unwrap();
        assert_eq!(list.lines().count(), CONCAT_REPEAT);
        assert!(state.messages.is_empty().await.unwrap());
    }
}
