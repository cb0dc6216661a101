//! 产物元数据
//!
//! 每个产物旁边写一个 `<产物文件名>.metadata.json`，记录来源（关键词、阶段、模式、模型等）。
//! 元数据不是必需品：写入失败只记警告，不影响产物本身。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppResult, FileError};
use crate::infrastructure::{artifact_store, paths};
use crate::models::{RunMode, Stage};

/// 产物元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub keyword: String,
    pub output_name: String,
    pub stage: Stage,
    pub mode: RunMode,
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
    /// 产物字节数
    pub file_size: u64,
}

impl ArtifactMetadata {
    pub fn new(keyword: &str, output_name: &str, stage: Stage, mode: RunMode, file_size: u64) -> Self {
        Self {
            keyword: keyword.to_string(),
            output_name: output_name.to_string(),
            stage,
            mode,
            timestamp: Local::now(),
            model: None,
            voice: None,
            prompt_version: None,
            file_size,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_prompt_version(mut self, version: impl Into<String>) -> Self {
        self.prompt_version = Some(version.into());
        self
    }
}

/// 写入元数据旁路文件
///
/// # 返回
/// 成功时返回旁路文件路径；失败时记录警告并返回 `None`
pub async fn write_metadata(artifact: &Path, metadata: &ArtifactMetadata) -> Option<PathBuf> {
    let path = paths::sidecar_path(artifact);

    let json = match serde_json::to_string_pretty(metadata) {
        Ok(json) => json,
        Err(e) => {
            warn!("⚠️ 元数据序列化失败 ({}): {}", path.display(), e);
            return None;
        }
    };

    match artifact_store::write_text(&path, &json).await {
        Ok(_) => {
            debug!("元数据已写入: {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("⚠️ 元数据写入失败，产物保留: {}", e);
            None
        }
    }
}

/// 读取产物的元数据旁路文件
pub async fn read_metadata(artifact: &Path) -> AppResult<ArtifactMetadata> {
    let path = paths::sidecar_path(artifact);
    let content = artifact_store::read_text(&path).await?;
    let metadata = serde_json::from_str(&content).map_err(|e| FileError::ParseFailed {
        path,
        source: Box::new(e),
    })?;
    Ok(metadata)
}
