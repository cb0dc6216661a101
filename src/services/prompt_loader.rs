//! 提示词模板
//!
//! ## 职责
//! - 按 (种类, 版本) 加载 TOML 模板：`<prompt_dir>/<kind>/<version>.toml`
//! - 目录中没有时回退到编译进二进制的内置模板
//! - `{name}` 占位符替换，调用方传入的值优先于模板 `parameters`
//!
//! 模板格式：
//!
//! ```toml
//! name = "..."
//! description = "..."
//! tags = ["..."]
//! system_prompt = "..."
//! user_prompt_template = "... {info_content} ..."
//!
//! [parameters]
//! duration_minutes = 2
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, ConfigError, FileError};

/// 内置模板：(种类, 版本, 内容)
const BUILTIN_PROMPTS: &[(PromptKind, &str, &str)] = &[
    (
        PromptKind::Info,
        "default",
        include_str!("../../prompts/info_retrieval/default.toml"),
    ),
    (
        PromptKind::Script,
        "v2-tts",
        include_str!("../../prompts/script_generation/v2-tts.toml"),
    ),
];

/// 模板种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// 第 1 阶段：信息检索
    Info,
    /// 第 2 阶段：讲解词生成
    Script,
}

impl PromptKind {
    /// 模板子目录名
    pub fn dir_name(self) -> &'static str {
        match self {
            PromptKind::Info => "info_retrieval",
            PromptKind::Script => "script_generation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" | "info_retrieval" => Some(PromptKind::Info),
            "script" | "script_generation" => Some(PromptKind::Script),
            _ => None,
        }
    }
}

/// 提示词模板
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    /// 版本（取自文件名，不在文件内声明）
    #[serde(skip)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt_template: String,
}

impl PromptTemplate {
    pub fn from_toml(version: &str, content: &str, origin: &Path) -> AppResult<Self> {
        let mut template: PromptTemplate =
            toml::from_str(content).map_err(|e| FileError::ParseFailed {
                path: origin.to_path_buf(),
                source: Box::new(e),
            })?;
        template.version = version.to_string();
        Ok(template)
    }

    /// 系统提示词，空白时返回 `None`
    pub fn system(&self) -> Option<&str> {
        let s = self.system_prompt.trim();
        (!s.is_empty()).then_some(s)
    }

    /// 渲染用户提示词
    ///
    /// `{{` / `}}` 输出字面量花括号；引用了未提供的参数时报错。
    pub fn format_user_prompt(&self, values: &[(&str, &str)]) -> AppResult<String> {
        let mut params: BTreeMap<&str, String> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.as_str(), value_to_string(v)))
            .collect();
        for &(k, v) in values {
            params.insert(k, v.to_string());
        }

        render(&self.user_prompt_template, &params).map_err(|missing| {
            AppError::Config(ConfigError::InvalidOption {
                field: format!("prompt {}.{missing}", self.version),
                reason: "模板引用了未提供的参数".to_string(),
            })
        })
    }
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 简单的占位符替换，失败时返回缺失的参数名
fn render(template: &str, params: &BTreeMap<&str, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    out.push('{');
                    out.push_str(&name);
                    continue;
                }
                let value = params.get(name.trim()).ok_or_else(|| name.clone())?;
                out.push_str(value);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// 版本名只能是单个文件名
fn is_plain_version(version: &str) -> bool {
    !version.is_empty()
        && version != "."
        && !version.contains("..")
        && !version.contains(['/', '\\'])
}

/// 模板加载器
#[derive(Debug, Clone)]
pub struct PromptLoader {
    prompt_dir: PathBuf,
}

impl PromptLoader {
    pub fn new(prompt_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt_dir: prompt_dir.into(),
        }
    }

    /// 加载指定版本的模板
    ///
    /// # 参数
    /// - `kind`: 模板种类
    /// - `version`: 版本名（文件名，不含 `.toml`）
    ///
    /// # 返回
    /// 目录与内置模板中都不存在时返回 `PromptNotFound`，附带可用版本列表
    pub async fn load(&self, kind: PromptKind, version: &str) -> AppResult<PromptTemplate> {
        let version = version.trim_end_matches(".toml");
        if !is_plain_version(version) {
            return Err(ConfigError::InvalidOption {
                field: format!("{} 提示词版本", kind.dir_name()),
                reason: format!("'{version}' 不能包含路径分隔符或 '..'"),
            }
            .into());
        }
        let path = self
            .prompt_dir
            .join(kind.dir_name())
            .join(format!("{version}.toml"));

        match fs::read_to_string(&path).await {
            Ok(content) => {
                let template = PromptTemplate::from_toml(version, &content, &path)?;
                info!("📝 提示词模板: {} ({})", template.name, path.display());
                return Ok(template);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::read_failed(&path, e)),
        }

        if let Some((_, _, content)) = BUILTIN_PROMPTS
            .iter()
            .find(|(k, v, _)| *k == kind && *v == version)
        {
            debug!("使用内置提示词模板 {}/{}", kind.dir_name(), version);
            let origin = PathBuf::from(format!("<builtin>/{}/{version}.toml", kind.dir_name()));
            return PromptTemplate::from_toml(version, content, &origin);
        }

        Err(ConfigError::PromptNotFound {
            kind: kind.dir_name().to_string(),
            version: version.to_string(),
            available: self.list(kind).await,
        }
        .into())
    }

    /// 列出可用版本（目录中的 + 内置的，去重排序）
    pub async fn list(&self, kind: PromptKind) -> Vec<String> {
        let mut versions: BTreeSet<String> = BUILTIN_PROMPTS
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, v, _)| v.to_string())
            .collect();

        let dir = self.prompt_dir.join(kind.dir_name());
        if let Ok(mut entries) = fs::read_dir(&dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        versions.insert(stem.to_string());
                    }
                }
            }
        }

        versions.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_builtin_templates_parse() {
        for (kind, version, content) in BUILTIN_PROMPTS {
            let t = PromptTemplate::from_toml(version, content, Path::new("builtin")).unwrap();
            assert!(!t.name.is_empty(), "{:?}", kind);
            assert!(t.system().is_some());
        }
    }

    #[test]
    fn test_format_user_prompt_prefers_caller_values() {
        let t = PromptTemplate::from_toml(
            "v1",
            r#"
user_prompt_template = "{{literal}} {info_content} / {duration_minutes}분"
[parameters]
duration_minutes = 2
"#,
            Path::new("t.toml"),
        )
        .unwrap();

        assert_eq!(
            t.format_user_prompt(&[("info_content", "본문")]).unwrap(),
            "{literal} 본문 / 2분"
        );
        assert_eq!(
            t.format_user_prompt(&[("info_content", "x"), ("duration_minutes", "3")])
                .unwrap(),
            "{literal} x / 3분"
        );

        let err = t.format_user_prompt(&[]).unwrap_err();
        assert!(err.to_string().contains("info_content"));
    }

    #[tokio::test]
    async fn test_directory_overrides_and_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let script_dir = dir.path().join("script_generation");
        fs::create_dir_all(&script_dir).await.unwrap();
        fs::write(
            script_dir.join("v3.toml"),
            "name = \"v3\"\nuser_prompt_template = \"{info_content}\"\n",
        )
        .await
        .unwrap();

        let loader = PromptLoader::new(dir.path());
        let t = loader.load(PromptKind::Script, "v3").await.unwrap();
        assert_eq!(t.version, "v3");

        // 目录中没有 v2-tts，回退到内置模板
        let builtin = loader.load(PromptKind::Script, "v2-tts").await.unwrap();
        assert!(builtin.user_prompt_template.contains("{info_content}"));

        assert_eq!(
            loader.list(PromptKind::Script).await,
            vec!["v2-tts".to_string(), "v3".to_string()]
        );

        let err = loader.load(PromptKind::Script, "v9").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("v9") && msg.contains("v3"), "{msg}");
        assert!(err.remediation_hint().is_some());
    }

    #[tokio::test]
    async fn test_version_cannot_escape_prompt_dir() {
        let dir = tempfile::tempdir().unwrap();
        let prompt_dir = dir.path().join("prompts");
        fs::create_dir_all(&prompt_dir).await.unwrap();
        fs::write(
            dir.path().join("outside.toml"),
            "name = \"outside\"\nuser_prompt_template = \"{keyword}\"\n",
        )
        .await
        .unwrap();

        let loader = PromptLoader::new(&prompt_dir);
        for version in ["../../outside", "../outside", "a/b", "a\\b", ".."] {
            let err = loader.load(PromptKind::Info, version).await.unwrap_err();
            assert_eq!(err.classification(), ErrorClass::Configuration, "{version}");
            assert!(err.to_string().contains("路径分隔符"), "{version}");
        }
    }
}
