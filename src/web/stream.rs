use crate::engine::Engine;
use crate::error::StreamError;
use crate::request::StreamRequest;
use crate::state::SharedState;
use crate::supervisor::StreamStatus;
use crate::web::extract::ApiJson;
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

type ApiResult = Result<Json<Value>, StreamError>;

/// 启动推流 API
pub async fn handle_start(
    State(state): State<SharedState>,
    ApiJson(request): ApiJson<StreamRequest>,
) -> ApiResult {
    let status = Engine::start_stream(&state, &request).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Streaming started successfully",
        "status": status,
    })))
}

/// 停止推流 API
pub async fn handle_stop(State(state): State<SharedState>) -> ApiResult {
    Engine::stop_stream(&state).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Stream stopped successfully",
    })))
}

/// 推流状态 API，不阻塞
pub async fn stream_status(State(state): State<SharedState>) -> Json<StreamStatus> {
    Json(state.supervisor.status())
}

/// 机器人客户端使用的状态格式: `{isStreaming, streamInfo: {startTime, rtmpPlatform} | null}`
pub async fn streaming_status(State(state): State<SharedState>) -> Json<Value> {
    let status = state.supervisor.status();
    let stream_info = if status.is_streaming {
        json!({
            "startTime": status.started_at,
            "rtmpPlatform": status.platform_label.as_deref().unwrap_or("Unknown"),
        })
    } else {
        Value::Null
    };
    Json(json!({
        "isStreaming": status.is_streaming,
        "streamInfo": stream_info,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    // 未推流时应先返回 NotStreaming，缺字段不在提取阶段拒绝
    #[serde(default)]
    pub message: String,
}

/// 推送叠加消息 API
pub async fn send_message(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<MessageBody>,
) -> ApiResult {
    state.messages.send(&state.supervisor, &body.message).await?;
    Ok(Json(json!({ "success": true })))
}

/// 清空叠加消息 API
pub async fn clear_messages(State(state): State<SharedState>) -> ApiResult {
    state.messages.clear(&state.supervisor).await?;
    Ok(Json(json!({ "success": true, "message": "Messages cleared" })))
}

/// 查询当前消息是否为空
pub async fn check_messages(State(state): State<SharedState>) -> ApiResult {
    let is_empty = state.messages.is_empty().await?;
    Ok(Json(json!({ "isEmpty": is_empty })))
}
