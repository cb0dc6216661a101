use std::path::PathBuf;

use crate::error::{AppResult, ConfigError};

/// 程序配置
///
/// 只放环境相关的内容（密钥、端点、目录）；每次运行的阶段选项见 `PipelineOptions`。
#[derive(Clone, Debug)]
pub struct Config {
    // --- 文本模型（OpenAI 兼容接口） ---
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    // --- 语音合成（Gemini） ---
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    /// 输出根目录
    pub output_root: PathBuf,
    /// 提示词模板目录
    pub prompt_dir: PathBuf,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_api_base: "https://api.openai.com/v1".to_string(),
            gemini_api_key: None,
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            output_root: PathBuf::from("outputs"),
            prompt_dir: PathBuf::from("prompts"),
            request_timeout_secs: 300,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    ///
    /// 数值型变量无法解析时返回配置错误。
    pub fn from_env() -> AppResult<Self> {
        let default = Self::default();
        Ok(Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_api_base: std::env::var("OPENAI_API_BASE").unwrap_or(default.openai_api_base),
            gemini_api_key: non_empty_var("GEMINI_API_KEY"),
            gemini_api_base: std::env::var("GEMINI_API_BASE").unwrap_or(default.gemini_api_base),
            output_root: std::env::var("AUDIO_GUIDE_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.output_root),
            prompt_dir: std::env::var("AUDIO_GUIDE_PROMPT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.prompt_dir),
            request_timeout_secs: parse_var("AUDIO_GUIDE_REQUEST_TIMEOUT_SECS", "u64")?
                .unwrap_or(default.request_timeout_secs),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, expected_type: &str) -> AppResult<Option<T>> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(None);
    };
    raw.trim().parse().map(Some).map_err(|_| {
        ConfigError::EnvVarParseFailed {
            var_name: name.to_string(),
            value: raw.clone(),
            expected_type: expected_type.to_string(),
        }
        .into()
    })
}
