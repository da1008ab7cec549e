use crate::error::{StreamError, StreamResult};
use crate::graph::{BlurRegion, LogoPosition};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// 视频来源
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InputSource {
    /// 直接填写的远程地址
    Url { url: String },
    /// 从上传的 M3U 列表中选中的频道
    Playlist {
        url: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// 本地视频目录中的若干文件，循环播放
    LocalFiles { files: Vec<String> },
}

/// 开始推流请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamRequest {
    pub rtmp_url: String,
    pub stream_key: String,
    pub input_source: Option<InputSource>,
    /// 旧版客户端只提交地址字符串
    pub m3u8_url: Option<String>,
    pub enable_zoom: bool,
    pub zoom_level: Option<f64>,
    pub blur: Option<BlurRegion>,
    /// 旧版客户端以 crop 表达式提交打码区域
    pub filter_complex: Option<String>,
    pub use_mp3_audio: bool,
    pub logo_path: Option<String>,
    pub logo_position: Option<String>,
}

/// 已校验的视频来源
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSelection {
    Remote(String),
    LocalFiles(Vec<String>),
}

/// 校验通过、可以交给引擎的请求
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub destination: String,
    pub source: SourceSelection,
    pub zoom: Option<f64>,
    pub blur: Option<BlurRegion>,
    pub use_audio_track: bool,
    /// 台标文件名 (位于上传目录内) 与位置
    pub logo: Option<(String, LogoPosition)>,
}

/// 拼接推流地址与串流密钥
///
/// 密钥去掉首尾的 `/`；若地址已经以 `/密钥` 结尾则不重复追加。
pub fn destination_url(base: &str, key: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let key = key.trim().trim_matches('/');
    if base.ends_with(&format!("/{key}")) {
        base.to_string()
    } else {
        format!("{base}/{key}")
    }
}

/// 只接受不带目录成分的文件名
pub fn bare_file_name(name: &str) -> Option<&str> {
    let name = name.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return None;
    }
    Some(name)
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

impl StreamRequest {
    fn source(&self) -> StreamResult<Option<SourceSelection>> {
        let source = match &self.input_source {
            Some(InputSource::Url { url }) => {
                non_empty(url).map(|u| SourceSelection::Remote(u.to_string()))
            }
            Some(InputSource::Playlist { url, name }) => {
                debug!("Playlist channel selected: {:?}", name);
                non_empty(url).map(|u| SourceSelection::Remote(u.to_string()))
            }
            Some(InputSource::LocalFiles { files }) => {
                if files.is_empty() {
                    None
                } else {
                    let mut names = Vec::with_capacity(files.len());
                    for file in files {
                        let name = bare_file_name(file).ok_or_else(|| {
                            StreamError::validation(format!("Invalid video file name: {file:?}"))
                        })?;
                        names.push(name.to_string());
                    }
                    Some(SourceSelection::LocalFiles(names))
                }
            }
            None => self
                .m3u8_url
                .as_deref()
                .and_then(non_empty)
                .map(|u| SourceSelection::Remote(u.to_string())),
        };
        Ok(source)
    }

    fn blur_region(&self) -> StreamResult<Option<BlurRegion>> {
        let region = match (&self.blur, self.filter_complex.as_deref().and_then(non_empty)) {
            (Some(region), _) => Some(*region),
            (None, Some(expr)) => Some(BlurRegion::from_crop_expr(expr).ok_or_else(|| {
                StreamError::validation("Blur region must be given as x, y, width and height")
            })?),
            (None, None) => None,
        };
        if let Some(region) = &region {
            region.validate()?;
        }
        Ok(region)
    }

    fn zoom(&self) -> StreamResult<Option<f64>> {
        if !self.enable_zoom {
            return Ok(None);
        }
        let step = self.zoom_level.unwrap_or(1.0);
        if !step.is_finite() || step <= 0.0 {
            return Err(StreamError::validation("Zoom level must be a positive number"));
        }
        Ok(Some(step))
    }

    fn logo(&self) -> StreamResult<Option<(String, LogoPosition)>> {
        let Some(raw) = self.logo_path.as_deref().and_then(non_empty) else {
            return Ok(None);
        };
        // 上传接口返回完整路径，这里只取文件名，限定在上传目录内
        let name = Path::new(raw)
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(bare_file_name)
            .ok_or_else(|| StreamError::validation(format!("Invalid logo path: {raw:?}")))?;
        let position = self
            .logo_position
            .as_deref()
            .map(LogoPosition::parse_lenient)
            .unwrap_or_default();
        Ok(Some((name.to_string(), position)))
    }

    /// 在任何副作用之前完成全部校验
    pub fn validate(&self) -> StreamResult<ValidatedRequest> {
        let base = non_empty(&self.rtmp_url);
        let key = non_empty(self.stream_key.trim_matches('/'));
        let source = self.source()?;

        let (Some(base), Some(key), Some(source)) = (base, key, source) else {
            return Err(StreamError::validation(
                "RTMP URL, Stream Key, and Input Source are required.",
            ));
        };

        Ok(ValidatedRequest {
            destination: destination_url(base, key),
            source,
            zoom: self.zoom()?,
            blur: self.blur_region()?,
            use_audio_track: self.use_mp3_audio,
            logo: self.logo()?,
        })
    }
}
