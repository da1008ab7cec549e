use crate::error::{StreamError, StreamResult};
use crate::graph::PipelineSpec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// 本地推流服务器使用的固定平台名
pub const LOCAL_PLATFORM_LABEL: &str = "Local RTMP";

/// 当前推流会话
struct ActiveSession {
    /// 会话编号，退出回调据此判断自己清理的是否仍是同一个会话
    id: u64,
    started_at: DateTime<Utc>,
    platform: String,
    pid: Option<u32>,
    /// 通知退出观察任务结束子进程
    kill: Option<oneshot::Sender<()>>,
}

/// 推流状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub is_streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_label: Option<String>,
}

/// 转码进程管理器，同一时间至多持有一个子进程
#[derive(Default)]
pub struct Supervisor {
    session: Arc<Mutex<Option<ActiveSession>>>,
    next_id: AtomicU64,
}

fn lock(session: &Mutex<Option<ActiveSession>>) -> MutexGuard<'_, Option<ActiveSession>> {
    // 持锁期间不会 panic，中毒时直接沿用内部数据
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动转码进程
    ///
    /// # 副作用
    /// - 启动子进程，stderr 转发到日志
    /// - 注册退出观察任务：进程因任何原因退出后清空会话
    ///
    /// # 错误处理
    /// - 已有进程时返回 AlreadyRunning，不会尝试启动
    /// - 启动失败时不持有任何进程
    pub fn start(&self, spec: &PipelineSpec) -> StreamResult<StreamStatus> {
        let mut slot = lock(&self.session);
        if slot.is_some() {
            return Err(StreamError::AlreadyRunning);
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", spec.program, e);
            StreamError::Spawn(e)
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pid = child.id();
        let platform = platform_label(&spec.destination);
        let started_at = Utc::now();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let session = self.session.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill transcoder (pid {:?}): {}", pid, e);
                    }
                    child.wait().await
                }
            };

            match status {
                Ok(status) => info!("Transcoder (pid {:?}) exited with {}", pid, status),
                Err(e) => error!("Process monitor error (pid {:?}): {}", pid, e),
            }

            // 只清理属于自己的会话；stop() 已清理或已有新会话时什么都不做
            let mut slot = lock(&session);
            if slot.as_ref().is_some_and(|s| s.id == id) {
                warn!("Stream session {} ended without stop request", id);
                *slot = None;
            }
        });

        info!(
            "Stream session {} started (pid {:?}) to {}",
            id, pid, platform
        );

        *slot = Some(ActiveSession {
            id,
            started_at,
            platform: platform.clone(),
            pid,
            kill: Some(kill_tx),
        });

        Ok(StreamStatus {
            is_streaming: true,
            started_at: Some(started_at),
            platform_label: Some(platform),
        })
    }

    /// 停止转码进程
    ///
    /// 会话状态在返回前同步清空，不等待子进程真正退出。
    pub fn stop(&self) -> StreamResult<()> {
        let session = lock(&self.session).take();
        let Some(mut session) = session else {
            return Err(StreamError::NotRunning);
        };

        if let Some(kill) = session.kill.take() {
            // 观察任务已结束时发送失败，说明进程已经退出
            let _ = kill.send(());
        }
        info!("Stream session {} (pid {:?}) stopped", session.id, session.pid);
        Ok(())
    }

    pub fn status(&self) -> StreamStatus {
        match lock(&self.session).as_ref() {
            Some(s) => StreamStatus {
                is_streaming: true,
                started_at: Some(s.started_at),
                platform_label: Some(s.platform.clone()),
            },
            None => StreamStatus {
                is_streaming: false,
                started_at: None,
                platform_label: None,
            },
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.session).is_some()
    }
}

/// 逐行转发转码器 stderr，文字/字体相关的行提升为警告
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let lower = line.to_ascii_lowercase();
                if lower.contains("drawtext") || lower.contains("font") {
                    warn!(target: "ffmpeg", "{}", line);
                } else {
                    debug!(target: "ffmpeg", "{}", line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read transcoder output: {}", e);
                break;
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 从推流地址推导平台显示名
///
/// `rtmp://live.twitch.tv/app` → `Twitch`；本地地址固定为 [`LOCAL_PLATFORM_LABEL`]；
/// 域名不足两段时使用整个主机名。
pub fn platform_label(url: &str) -> String {
    if url.contains("localhost") || url.contains("127.0.0.1") {
        return LOCAL_PLATFORM_LABEL.to_string();
    }

    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split('/').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    if host.is_empty() {
        return "Unknown".to_string();
    }

    let parts: Vec<&str> = host.split('.').collect();
    let main = if parts.len() >= 2 {
        parts[parts.len() - 2]
    } else {
        host
    };
    capitalize(main)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(program: &str, args: &[&str]) -> PipelineSpec {
        PipelineSpec {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            destination: "rtmp://live.twitch.tv/app/key".to_string(),
        }
    }

    async fn wait_until_stopped(supervisor: &Supervisor) -> bool {
        for _ in 0..100 {
            if !supervisor.is_running() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[test]
    fn platform_labels() {
        assert_eq!(platform_label("rtmp://live.twitch.tv/app"), "Twitch");
        assert_eq!(platform_label("rtmps://a.rtmp.youtube.com:443/live2"), "Youtube");
        assert_eq!(platform_label("rtmp://127.0.0.1/live"), LOCAL_PLATFORM_LABEL);
        assert_eq!(platform_label("rtmp://localhost:1935/live"), LOCAL_PLATFORM_LABEL);
        assert_eq!(platform_label("rtmp://mediaserver/live"), "Mediaserver");
        assert_eq!(platform_label("rtmp:///live"), "Unknown");
    }

    #[tokio::test]
    async fn status_is_idle_initially() {
        let supervisor = Supervisor::new();
        let status = supervisor.status();
        assert!(!status.is_streaming);
        assert!(status.started_at.is_none());
        assert!(status.platform_label.is_none());
    }

    #[tokio::test]
    async fn stop_without_session_is_rejected() {
        let supervisor = Supervisor::new();
        assert!(matches!(supervisor.stop(), Err(StreamError::NotRunning)));
        assert!(!supervisor.status().is_streaming);
    }

    #[tokio::test]
    async fn missing_program_leaves_no_session() {
        let supervisor = Supervisor::new();
        let err = supervisor
            .start(&spec("/nonexistent/transcoder-binary", &[]))
            .unwrap_err();
        assert!(matches!(err, StreamError::Spawn(_)));
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let supervisor = Supervisor::new();
        let status = supervisor.start(&spec("sleep", &["30"])).unwrap();
        assert!(status.is_streaming);
        assert_eq!(status.platform_label.as_deref(), Some("Twitch"));

        let err = supervisor.start(&spec("sleep", &["30"])).unwrap_err();
        assert!(matches!(err, StreamError::AlreadyRunning));

        supervisor.stop().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_clears_status_immediately() {
        let supervisor = Supervisor::new();
        supervisor.start(&spec("sleep", &["30"])).unwrap();
        assert!(supervisor.status().started_at.is_some());

        supervisor.stop().unwrap();
        let status = supervisor.status();
        assert!(!status.is_streaming);
        assert!(status.started_at.is_none());
        assert!(status.platform_label.is_none());

        // 旧会话的退出回调不能影响新会话
        supervisor.start(&spec("sleep", &["30"])).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(supervisor.is_running());
        supervisor.stop().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn crash_is_observed_without_stop() {
        let supervisor = Supervisor::new();
        supervisor.start(&spec("false", &[])).unwrap();

        assert!(wait_until_stopped(&supervisor).await);
        assert!(!supervisor.status().is_streaming);
        assert!(matches!(supervisor.stop(), Err(StreamError::NotRunning)));
    }
}
