use crate::config::AppConfig;
use crate::message::MessageChannel;
use crate::overlay::TextOverlayStore;
use crate::supervisor::Supervisor;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 全局应用上下文
pub struct AppState {
    pub config: AppConfig,
    /// 转码进程与推流会话
    pub supervisor: Supervisor,
    /// 实时叠加消息文件
    pub messages: MessageChannel,
    /// 文字样式持久化
    pub styles: TextOverlayStore,
    /// 启停操作的串行化锁
    pub control: Mutex<()>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let data_dir = config.server.data_dir.clone();
        Self {
            supervisor: Supervisor::new(),
            messages: MessageChannel::new(data_dir.join("messages.txt")),
            styles: TextOverlayStore::new(data_dir.join("text_styles.json")),
            control: Mutex::new(()),
            config,
        }
    }
}

pub type SharedState = Arc<AppState>;
