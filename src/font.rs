use crate::error::{StreamError, StreamResult};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &["/System/Library/Fonts/Helvetica.ttc"];

#[cfg(target_os = "windows")]
const CANDIDATES: &[&str] = &["C:\\Windows\\Fonts\\arial.ttf"];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/Arial.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
];

fn first_existing<'a, I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    candidates
        .into_iter()
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
}

/// 查找 drawtext 使用的字体：优先配置文件指定的字体，否则按平台常见路径查找
pub fn resolve_font(configured: Option<&Path>) -> StreamResult<PathBuf> {
    let found = match configured {
        Some(path) => first_existing([path]),
        None => first_existing(CANDIDATES.iter().map(Path::new)),
    };

    match found {
        Some(path) => {
            info!("Using font: {:?}", path);
            Ok(path)
        }
        None => {
            error!("No suitable font found (configured: {:?})", configured);
            Err(StreamError::FontNotFound)
        }
    }
}
