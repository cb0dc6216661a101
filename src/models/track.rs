//! 轨道定义（批量任务）
//!
//! TOML 格式：
//!
//! ```toml
//! track_name = "경복궁 투어"
//! description = "..."
//!
//! [metadata]
//! author = "..."
//!
//! [defaults]
//! voice = "Zephyr"
//! dry_run = false
//!
//! [[files]]
//! output_name = "01_근정전"
//! keyword = "근정전"
//! voice = "Kore"     # 只覆盖这一项
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::infrastructure::paths;
use crate::models::options::{OptionOverrides, PipelineOptions};

/// 轨道定义
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackDefinition {
    #[serde(default)]
    pub track_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 原样写入报告的自由字段
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub defaults: TrackDefaults,
    #[serde(default)]
    pub files: Vec<FileJob>,
}

/// 轨道级默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackDefaults {
    /// 为 true 时整条轨道以模拟模式运行
    #[serde(default)]
    pub dry_run: bool,
    #[serde(flatten)]
    pub options: OptionOverrides,
}

/// 轨道中的单个条目
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileJob {
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    /// 跳过此条目，只在报告中记录
    #[serde(default)]
    pub skip: bool,
    #[serde(flatten)]
    pub overrides: OptionOverrides,
}

impl FileJob {
    pub fn new(output_name: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            output_name: Some(output_name.into()),
            keyword: Some(keyword.into()),
            ..Default::default()
        }
    }
}

/// 与 defaults 合并并通过校验后的条目
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    /// 条目序号（从 1 开始）
    pub index: usize,
    pub output_name: String,
    pub keyword: String,
    pub options: PipelineOptions,
    pub skip: bool,
}

impl TrackDefinition {
    /// 校验整条轨道并解析出每个条目的最终选项
    ///
    /// 任何条目不合法都会让整条轨道失败，一个条目都不会执行。
    pub fn resolve_jobs(&self) -> AppResult<Vec<ResolvedJob>> {
        self.resolve_jobs_with(&OptionOverrides::default())
    }

    /// 同 [`resolve_jobs`](Self::resolve_jobs)，另外叠加命令行给出的选项
    ///
    /// 优先级：条目覆盖 > 轨道 defaults > 命令行 > 内置默认值。
    pub fn resolve_jobs_with(&self, cli: &OptionOverrides) -> AppResult<Vec<ResolvedJob>> {
        if self.track_name.trim().is_empty() {
            return Err(AppError::invalid_track("track_name", "缺少或为空"));
        }
        paths::slugify(&self.track_name)?;

        if self.files.is_empty() {
            return Err(AppError::invalid_track(
                "files",
                "列表为空，至少需要一个条目",
            ));
        }

        self.files
            .iter()
            .enumerate()
            .map(|(idx, file)| self.resolve_job(idx, file, cli))
            .collect()
    }

    fn resolve_job(
        &self,
        idx: usize,
        file: &FileJob,
        cli: &OptionOverrides,
    ) -> AppResult<ResolvedJob> {
        let required = |value: &Option<String>, name: &str| -> AppResult<String> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(AppError::invalid_track(
                    format!("files[{idx}].{name}"),
                    "缺少或为空",
                )),
            }
        };

        let output_name = required(&file.output_name, "output_name")?;
        let keyword = required(&file.keyword, "keyword")?;
        paths::slugify(&output_name).map_err(|_| {
            AppError::invalid_track(
                format!("files[{idx}].output_name"),
                format!("'{output_name}' 清洗后无法作为文件名"),
            )
        })?;

        let options = file
            .overrides
            .clone()
            .or(&self.defaults.options)
            .or(cli)
            .resolve();
        options.validate().map_err(|e| {
            AppError::invalid_track(format!("files[{idx}]"), e.to_string())
        })?;

        Ok(ResolvedJob {
            index: idx + 1,
            output_name,
            keyword,
            options,
            skip: file.skip,
        })
    }
}
