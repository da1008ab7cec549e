use std::io::Write;
use std::path::{Path, PathBuf};

fn write_atomic_blocking(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let prefix = format!(
        ".{}.",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );

    // 临时文件与目标同目录，rename 不会跨文件系统；出错时随 drop 自动删除
    let mut staging = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)?;
    staging.write_all(contents)?;
    staging.as_file().sync_all()?;
    staging.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// 原子替换文件内容
///
/// 先完整写入临时文件并落盘，再 rename 覆盖目标路径。
/// 读取方只会看到旧内容或新内容，不会读到写了一半的文件。
/// 失败时目标文件保持原样。
pub async fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let target: PathBuf = target.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&target, &contents))
        .await
        .map_err(std::io::Error::other)?
}
