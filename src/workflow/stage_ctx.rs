//! 阶段上下文
//!
//! 封装"我正在为哪个关键词、以什么名字、在哪个根目录下生成产物"这一信息

use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::error::{AppResult, ConfigError};
use crate::infrastructure::paths::{self, OutputLayout, RunScope};
use crate::models::{RunMode, Stage};

/// 阶段上下文
///
/// 同一个上下文在三个阶段之间共享，所以三个阶段解析出的路径必然一致。
#[derive(Debug, Clone)]
pub struct StageCtx {
    /// 关键词（已去除首尾空白）
    pub keyword: String,

    /// 输出名覆盖
    pub output_name: Option<String>,

    /// 运行模式
    pub mode: RunMode,

    layout: OutputLayout,
}

impl StageCtx {
    /// 创建新的阶段上下文
    ///
    /// 关键词为空，或者用于命名的名称清洗后为空时返回配置错误。
    pub fn new(
        keyword: &str,
        output_name: Option<&str>,
        mode: RunMode,
        output_root: &Path,
        scope: &RunScope,
    ) -> AppResult<Self> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ConfigError::InvalidName {
                field: "keyword".to_string(),
                raw: keyword.to_string(),
            }
            .into());
        }

        let output_name = output_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let ctx = Self {
            keyword: keyword.to_string(),
            output_name,
            mode,
            layout: OutputLayout::new(output_root, mode, scope),
        };
        paths::slugify(ctx.name()).map_err(|_| ConfigError::InvalidName {
            field: if ctx.output_name.is_some() { "output_name" } else { "keyword" }.to_string(),
            raw: ctx.name().to_string(),
        })?;
        Ok(ctx)
    }

    /// 产物命名使用的名称
    pub fn name(&self) -> &str {
        paths::base_name(&self.keyword, self.output_name.as_deref())
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// 某阶段产物的规范路径
    pub fn artifact_path(&self, stage: Stage) -> AppResult<PathBuf> {
        self.layout.resolve(stage, self.name())
    }
}

impl Display for StageCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.output_name {
            Some(name) => write!(f, "[{} ({}) {}]", name, self.keyword, self.mode),
            None => write!(f, "[{} {}]", self.keyword, self.mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctx_paths_follow_layout() {
        let ctx = StageCtx::new(
            " 경복궁 ",
            Some("01_경복궁"),
            RunMode::Mock,
            Path::new("out"),
            &RunScope::Standalone,
        )
        .unwrap();

        assert_eq!(ctx.keyword, "경복궁");
        assert_eq!(ctx.name(), "01_경복궁");
        assert_eq!(
            ctx.artifact_path(Stage::Script).unwrap(),
            PathBuf::from("out/mock/script/01_경복궁_script.md")
        );
        assert_eq!(ctx.to_string(), "[01_경복궁 (경복궁) mock]");
    }

    #[test]
    fn test_ctx_rejects_empty_names() {
        let root = Path::new("out");
        assert!(StageCtx::new("  ", None, RunMode::Mock, root, &RunScope::Standalone).is_err());
        let err =
            StageCtx::new("???", None, RunMode::Mock, root, &RunScope::Standalone).unwrap_err();
        assert!(err.to_string().contains("keyword"));
        // 覆盖名为空白时退回关键词
        let ctx = StageCtx::new("k", Some(" "), RunMode::Mock, root, &RunScope::Standalone).unwrap();
        assert_eq!(ctx.name(), "k");
    }
}
