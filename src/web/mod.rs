pub mod extract;
pub mod media;
pub mod overlay;
pub mod stream;

use crate::state::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

/// 上传接口的请求体上限
const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// 注册HTTP路由
pub fn router(state: SharedState) -> Router {
    let uploads = Router::new()
        .route("/api/upload-logo", post(media::upload_logo)) // 上传台标
        .route("/api/parse-m3u", post(media::parse_playlist)) // 解析 M3U 列表
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES));

    Router::new()
        .route("/api/start-stream", post(stream::handle_start)) // 启动推流
        .route("/api/stop-stream", post(stream::handle_stop)) // 停止推流
        .route("/api/stream-status", get(stream::stream_status)) // 推流状态
        .route("/api/streaming-status", get(stream::streaming_status)) // 机器人客户端的状态格式
        .route("/api/send-message", post(stream::send_message)) // 推送叠加消息
        .route("/api/clear-messages", post(stream::clear_messages)) // 清空叠加消息
        .route("/api/check-messages", get(stream::check_messages))
        .route("/api/text-styles", get(overlay::get_text_styles)) // 读取文字样式
        .route("/api/update-text-styles", post(overlay::update_text_styles)) // 更新文字样式
        .route("/uploads/:file_name", get(media::serve_upload)) // 台标预览
        .merge(uploads)
        .with_state(state)
}
