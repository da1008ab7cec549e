use crate::error::StreamError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};

/// JSON 请求体提取器
///
/// 与 `axum::Json` 相同，但解析失败时返回 [`StreamError::Validation`]，
/// 客户端始终收到 `{success: false, message}` 结构的 400 响应。
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = StreamError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| StreamError::validation(rejection.body_text()))
    }
}
