use crate::error::StreamError;
use crate::overlay::{StylePatch, TextOverlayStyle};
use crate::state::SharedState;
use crate::web::extract::ApiJson;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

pub async fn get_text_styles(State(state): State<SharedState>) -> Json<TextOverlayStyle> {
    Json(state.styles.read().await)
}

/// 部分更新文字样式，返回合并后的结果
pub async fn update_text_styles(
    State(state): State<SharedState>,
    ApiJson(patch): ApiJson<StylePatch>,
) -> Result<Json<Value>, StreamError> {
    info!("Received text styles update: {:?}", patch);
    let updated = state.styles.update(patch).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Text styles updated successfully",
        "textStyles": updated,
    })))
}
