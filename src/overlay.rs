use crate::error::{StreamError, StreamResult};
use crate::storage::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 文字叠加的动画方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Animation {
    Bounce,
    SlideLeft,
    SlideRight,
}

impl FromStr for Animation {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bounce" => Ok(Self::Bounce),
            "slide-left" => Ok(Self::SlideLeft),
            "slide-right" => Ok(Self::SlideRight),
            other => Err(StreamError::InvalidAnimation(other.to_string())),
        }
    }
}

/// 持久化的文字叠加样式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextOverlayStyle {
    pub font_size: u32,
    pub text_color: String,
    pub background_color: String,
    pub enable_background: bool,
    pub animation: Animation,
}

impl Default for TextOverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 70,
            text_color: "#ffffff".to_string(),
            background_color: "#000000".to_string(),
            enable_background: false,
            animation: Animation::Bounce,
        }
    }
}

/// 样式的部分更新，未出现的字段保持原值
///
/// `animation` 以字符串接收，交由 [`Animation::from_str`] 校验，
/// 这样非法取值得到的是 InvalidAnimation 而不是反序列化失败。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylePatch {
    pub font_size: Option<u32>,
    pub text_color: Option<String>,
    pub background_color: Option<String>,
    pub enable_background: Option<bool>,
    pub animation: Option<String>,
}

fn is_hex_color(value: &str) -> bool {
    let digits = value.strip_prefix('#').unwrap_or(value);
    digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

fn normalize_color(field: &str, value: &str) -> StreamResult<String> {
    if !is_hex_color(value) {
        return Err(StreamError::validation(format!(
            "{} must be a 6-digit hex color, got {:?}",
            field, value
        )));
    }
    let digits = value.strip_prefix('#').unwrap_or(value);
    Ok(format!("#{}", digits.to_ascii_lowercase()))
}

impl TextOverlayStyle {
    /// 校验补丁并逐字段合并，任何字段不合法都不改动当前值
    pub fn merged(&self, patch: &StylePatch) -> StreamResult<Self> {
        let mut next = self.clone();

        if let Some(animation) = &patch.animation {
            next.animation = animation.parse()?;
        }
        if let Some(size) = patch.font_size {
            if size == 0 {
                return Err(StreamError::validation("fontSize must be positive"));
            }
            next.font_size = size;
        }
        if let Some(color) = &patch.text_color {
            next.text_color = normalize_color("textColor", color)?;
        }
        if let Some(color) = &patch.background_color {
            next.background_color = normalize_color("backgroundColor", color)?;
        }
        if let Some(enabled) = patch.enable_background {
            next.enable_background = enabled;
        }

        Ok(next)
    }
}

/// 文字样式存储，JSON 文件持久化，进程重启后仍然有效
pub struct TextOverlayStore {
    path: PathBuf,
    // 串行化 read-merge-write，避免并发更新互相覆盖
    write_lock: Mutex<()>,
}

impl TextOverlayStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// 读取当前样式；文件不存在或无法解析时返回默认样式
    pub async fn read(&self) -> TextOverlayStyle {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Error reading text styles ({}), using defaults", e);
                TextOverlayStyle::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TextOverlayStyle::default(),
            Err(e) => {
                warn!("Failed to read {:?}: {}, using defaults", self.path, e);
                TextOverlayStyle::default()
            }
        }
    }

    pub async fn update(&self, patch: StylePatch) -> StreamResult<TextOverlayStyle> {
        let _guard = self.write_lock.lock().await;

        let current = self.read().await;
        let updated = current.merged(&patch)?;

        let json = serde_json::to_vec_pretty(&updated)
            .map_err(|e| StreamError::Io(std::io::Error::other(e)))?;
        write_atomic(&self.path, &json).await?;

        info!("Text styles updated: {:?}", updated);
        Ok(updated)
    }
}
