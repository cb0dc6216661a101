//! 路径命名约定
//!
//! ## 职责
//! - 把关键词（或覆盖名）清洗成文件名 slug
//! - 由 (运行模式, 作用域) 唯一确定输出根目录
//! - 由 (阶段, slug, 根目录) 唯一确定产物路径
//!
//! 所有阶段和批量运行器都只通过这里拿路径，三个阶段之间靠它完成文件交接。
//!
//! 目录结构：
//!
//! ```text
//! <output_root>/                    生产 / 单次运行
//! <output_root>/mock/               模拟 / 单次运行
//! <output_root>/tracks/<track>/     生产 / 轨道
//! <output_root>/mock/tracks/<track>/
//!     ├── info/<slug>.md
//!     ├── script/<slug>_script.md
//!     ├── audio/<slug>.wav
//!     └── batch_report.json         （仅轨道）
//! ```

use std::path::{Path, PathBuf};

use crate::error::{AppResult, ConfigError};
use crate::models::{RunMode, Stage};

/// 文件名中不允许出现的字符
const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const MOCK_DIR: &str = "mock";
const TRACKS_DIR: &str = "tracks";
const REPORT_FILE: &str = "batch_report.json";
const METADATA_SUFFIX: &str = ".metadata.json";

/// 把任意名称清洗成可用作单个路径段的 slug
///
/// 去掉 `<>:"/\|?*` 与控制字符，保留内部空格，去掉首尾空白。
/// 先删字符再 trim，所以对结果再执行一次得到的还是它本身。
///
/// # 返回
/// 清洗结果为空，或只剩 `.`（会变成 `.` / `..` 这类目录引用）时返回配置错误
pub fn slugify(raw: &str) -> AppResult<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !UNSAFE_CHARS.contains(c) && !c.is_control())
        .collect();
    let slug = cleaned.trim();

    if slug.is_empty() || slug.chars().all(|c| c == '.') {
        return Err(ConfigError::InvalidName {
            field: "name".to_string(),
            raw: raw.to_string(),
        }
        .into());
    }
    Ok(slug.to_string())
}

/// 产物的基础名：有覆盖名用覆盖名，否则用关键词
pub fn base_name<'a>(keyword: &'a str, output_name: Option<&'a str>) -> &'a str {
    match output_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => keyword,
    }
}

/// 阶段产物的文件名
pub fn artifact_file_name(stage: Stage, slug: &str) -> String {
    match stage {
        Stage::Info => format!("{slug}.md"),
        Stage::Script => format!("{slug}_script.md"),
        Stage::Audio => format!("{slug}.wav"),
    }
}

/// 产物对应的元数据旁路文件
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(METADATA_SUFFIX);
    artifact.with_file_name(name)
}

/// 运行作用域
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScope {
    /// 单次运行（CLI `run` / 单阶段命令）
    Standalone,
    /// 轨道运行，内含已清洗的轨道名
    Track(String),
}

impl RunScope {
    pub fn track(track_name: &str) -> AppResult<Self> {
        Ok(RunScope::Track(slugify(track_name)?))
    }
}

/// 一次运行的输出布局
///
/// 根目录只由 (output_root, 运行模式, 作用域) 决定，各阶段不做任何特殊处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    run_root: PathBuf,
}

impl OutputLayout {
    pub fn new(output_root: impl AsRef<Path>, mode: RunMode, scope: &RunScope) -> Self {
        let mut run_root = output_root.as_ref().to_path_buf();
        if mode.is_mock() {
            run_root.push(MOCK_DIR);
        }
        if let RunScope::Track(slug) = scope {
            run_root.push(TRACKS_DIR);
            run_root.push(slug);
        }
        Self { run_root }
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    /// 阶段目录：`<run_root>/<info|script|audio>`
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.run_root.join(stage.name())
    }

    /// 解析阶段产物路径
    ///
    /// 纯函数：相同输入总是得到逐字节相同的路径，不触碰文件系统。
    pub fn resolve(&self, stage: Stage, name: &str) -> AppResult<PathBuf> {
        let slug = slugify(name)?;
        Ok(self.stage_dir(stage).join(artifact_file_name(stage, &slug)))
    }

    /// 轨道报告路径
    pub fn report_path(&self) -> PathBuf {
        self.run_root.join(REPORT_FILE)
    }

    /// 创建三个阶段目录（幂等）
    pub async fn create_dirs(&self) -> AppResult<()> {
        for stage in Stage::ALL {
            let dir = self.stage_dir(stage);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| crate::error::AppError::write_failed(&dir, e))?;
        }
        Ok(())
    }
}

/// 一次性解析产物路径
pub fn resolve_path(
    stage: Stage,
    keyword: &str,
    output_name: Option<&str>,
    output_root: &Path,
    mode: RunMode,
    scope: &RunScope,
) -> AppResult<PathBuf> {
    OutputLayout::new(output_root, mode, scope).resolve(stage, base_name(keyword, output_name))
}
