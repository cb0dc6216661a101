use std::path::Path;

use tokio::fs;

use crate::error::{AppError, AppResult, FileError};
use crate::models::track::TrackDefinition;

/// 从 TOML 文件加载轨道定义
///
/// 只负责读取与解析，字段校验由 [`TrackDefinition::resolve_jobs`] 完成。
pub async fn load_track_definition(track_file: &Path) -> AppResult<TrackDefinition> {
    let content = fs::read_to_string(track_file)
        .await
        .map_err(|e| AppError::read_failed(track_file, e))?;

    let track: TrackDefinition =
        toml::from_str(&content).map_err(|e| FileError::ParseFailed {
            path: track_file.to_path_buf(),
            source: Box::new(e),
        })?;

    tracing::info!(
        "正在加载轨道: {} ({} 个条目)",
        track.track_name,
        track.files.len()
    );

    Ok(track)
}
