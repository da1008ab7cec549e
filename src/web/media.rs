use crate::error::StreamError;
use crate::graph::LogoPosition;
use crate::playlist::{parse_m3u, Channel};
use crate::request::bare_file_name;
use crate::state::SharedState;
use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::info;

fn multipart_error(e: MultipartError) -> StreamError {
    StreamError::validation(format!("Malformed upload: {}", e))
}

/// 上传台标
///
/// 表单字段：`logo` (图片文件)，`logoPosition` (可选，默认右下角)。
/// 文件保存为 `logo_<毫秒时间戳><扩展名>`。
pub async fn upload_logo(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StreamError> {
    let mut logo: Option<(String, axum::body::Bytes)> = None;
    let mut position = LogoPosition::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("logo") => {
                let original = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                logo = Some((original, data));
            }
            Some("logoPosition") => {
                let value = field.text().await.map_err(multipart_error)?;
                position = LogoPosition::parse_lenient(value.trim());
            }
            _ => {}
        }
    }

    let Some((original, data)) = logo else {
        return Err(StreamError::validation("No logo uploaded"));
    };

    // 根据扩展名判断类型，只接受图片
    let is_image = mime_guess::from_path(&original)
        .first()
        .is_some_and(|m| m.type_() == mime_guess::mime::IMAGE);
    if !is_image {
        return Err(StreamError::validation("Logo must be an image file"));
    }

    let extension = std::path::Path::new(&original)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    let uploads_dir = &state.config.server.uploads_dir;
    fs::create_dir_all(uploads_dir).await?;
    let logo_path = uploads_dir.join(format!("logo_{millis}{extension}"));
    fs::write(&logo_path, &data).await?;
    info!("Logo uploaded: {:?} ({} bytes)", logo_path, data.len());

    Ok(Json(json!({
        "success": true,
        "logoPath": logo_path.to_string_lossy(),
        "logoPosition": position.as_str(),
    })))
}

/// 解析上传的 M3U 列表，返回频道名称与地址
pub async fn parse_playlist(mut multipart: Multipart) -> Result<Json<Vec<Channel>>, StreamError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("m3uFile") {
            let content = field.text().await.map_err(multipart_error)?;
            let channels = parse_m3u(&content);
            info!("Parsed M3U playlist with {} channels", channels.len());
            return Ok(Json(channels));
        }
    }
    Err(StreamError::validation("No file uploaded"))
}

/// 回传已上传的台标文件，供管理页面预览
pub async fn serve_upload(
    State(state): State<SharedState>,
    Path(file_name): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let not_found = || (StatusCode::NOT_FOUND, "File not found".to_string());

    // 1. 只允许访问上传目录下的文件
    let name = bare_file_name(&file_name).ok_or_else(not_found)?;
    let file_path = state.config.server.uploads_dir.join(name);

    // 2. 打开文件
    let file = File::open(&file_path).await.map_err(|_| not_found())?;

    // 3. 根据扩展名确定 Content-Type
    let content_type = mime_guess::from_path(&file_path)
        .first_or_octet_stream()
        .to_string();

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
