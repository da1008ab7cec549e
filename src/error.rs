use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::path::PathBuf;
use tracing::error;

/// 推流控制面的错误分类
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// 请求参数不合法，未产生任何副作用
    #[error("{0}")]
    Validation(String),

    #[error("Stream is already running")]
    AlreadyRunning,

    #[error("No stream is currently running")]
    NotRunning,

    #[error("Stream is not running")]
    NotStreaming,

    #[error("Invalid animation type: {0}")]
    InvalidAnimation(String),

    #[error("No suitable font found")]
    FontNotFound,

    #[error("Required file is missing: {}", .0.display())]
    AssetMissing(PathBuf),

    #[error("Insufficient system memory ({0} KB available)")]
    InsufficientMemory(u64),

    #[error("Failed to spawn transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::AlreadyRunning
            | Self::NotRunning
            | Self::NotStreaming
            | Self::InvalidAnimation(_) => StatusCode::BAD_REQUEST,
            Self::FontNotFound
            | Self::AssetMissing(_)
            | Self::InsufficientMemory(_)
            | Self::Spawn(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(serde_json::json!({
            "success": false,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
