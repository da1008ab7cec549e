use crate::error::{StreamError, StreamResult};
use crate::storage::write_atomic;
use crate::supervisor::Supervisor;
use std::path::{Path, PathBuf};
use tracing::info;

/// 实时叠加消息通道
///
/// 转码器的 drawtext 以 `reload=1` 每帧重新读取 [`MessageChannel::path`]。
/// 每次更新都整体重写并原子替换，读取方不会看到写了一半的内容。
pub struct MessageChannel {
    path: PathBuf,
}

impl MessageChannel {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 推送一条消息，要求当前有推流
    pub async fn send(&self, session: &Supervisor, text: &str) -> StreamResult<()> {
        if !session.is_running() {
            return Err(StreamError::NotStreaming);
        }
        info!("Writing overlay message: {}", text);
        write_atomic(&self.path, format!("{text}\n").as_bytes()).await?;
        Ok(())
    }

    /// 清空消息，要求当前有推流
    pub async fn clear(&self, session: &Supervisor) -> StreamResult<()> {
        if !session.is_running() {
            return Err(StreamError::NotStreaming);
        }
        self.reset().await?;
        info!("Overlay message cleared");
        Ok(())
    }

    /// 内部重置：服务启动时和每次开始推流前调用，不检查会话状态
    pub async fn reset(&self) -> std::io::Result<()> {
        write_atomic(&self.path, b"").await
    }

    /// 消息是否为空 (文件缺失视为空)
    pub async fn is_empty(&self) -> std::io::Result<bool> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.trim().is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn send_and_clear_require_active_stream() {
        let dir = tempdir().unwrap();
        let channel = MessageChannel::new(dir.path().join("messages.txt"));
        let supervisor = Supervisor::new();

        assert!(matches!(
            channel.send(&supervisor, "hello").await,
            Err(StreamError::NotStreaming)
        ));
        assert!(matches!(
            channel.clear(&supervisor).await,
            Err(StreamError::NotStreaming)
        ));
        assert!(!channel.path().exists());
    }

    #[tokio::test]
    async fn reset_is_not_gated() {
        let dir = tempdir().unwrap();
        let channel = MessageChannel::new(dir.path().join("messages.txt"));
        std::fs::write(channel.path(), "stale").unwrap();

        channel.reset().await.unwrap();
        assert_eq!(std::fs::read_to_string(channel.path()).unwrap(), "");
        assert!(channel.is_empty().await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn send_rewrites_whole_buffer_while_streaming() {
        let dir = tempdir().unwrap();
        let channel = MessageChannel::new(dir.path().join("messages.txt"));
        let supervisor = Supervisor::new();
        supervisor
            .start(&crate::graph::PipelineSpec {
                program: "sleep".to_string(),
                args: vec!["30".to_string()],
                destination: "rtmp://127.0.0.1/live/key".to_string(),
            })
            .unwrap();

        channel.send(&supervisor, "a much longer first message").await.unwrap();
        channel.send(&supervisor, "short").await.unwrap();
        assert_eq!(std::fs::read_to_string(channel.path()).unwrap(), "short\n");
        assert!(!channel.is_empty().await.unwrap());

        channel.clear(&supervisor).await.unwrap();
        assert!(channel.is_empty().await.unwrap());

        supervisor.stop().unwrap();
    }
}
