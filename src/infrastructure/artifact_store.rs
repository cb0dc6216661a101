//! 产物读写
//!
//! ## 职责
//! - 原子写入：先写同目录临时文件，再 rename 覆盖目标，目标路径上不会出现半截文件
//! - 写入前创建父目录（幂等）
//! - 写入失败统一映射为 `ArtifactWrite` 类错误

use std::path::{Path, PathBuf};

use rand::Rng;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// 原子写入字节，返回写入的字节数
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<u64> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .map_err(|e| AppError::write_failed(parent, e))?;

    let tmp = temp_path(path);
    if let Err(e) = write_and_sync(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(AppError::write_failed(path, e));
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(AppError::write_failed(path, e));
    }

    debug!("已写入 {} ({} 字节)", path.display(), bytes.len());
    Ok(bytes.len() as u64)
}

/// 原子写入文本
pub async fn write_text(path: &Path, text: &str) -> AppResult<u64> {
    write_atomic(path, text.as_bytes()).await
}

/// 读取文本文件
pub async fn read_text(path: &Path) -> AppResult<String> {
    fs::read_to_string(path)
        .await
        .map_err(|e| AppError::read_failed(path, e))
}

pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn write_and_sync(tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tag: u32 = rand::thread_rng().gen();
    path.with_file_name(format!(".{name}.{tag:08x}.tmp"))
}
