//! 错误类型
//!
//! 按关注点嵌套：配置 / 服务商 / 文件，另加流水线专有的上游缺失与重试耗尽。
//! 每个错误都能给出一个 [`ErrorClass`]，重试策略和报告都只看这个分类。

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::models::Stage;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// 配置错误（凭据缺失、阶段选择非法、名称为空等），在任何外部调用之前发现
    Configuration,
    /// 上游产物缺失或为空
    MissingUpstream,
    /// 临时性错误（网络抖动、服务端 5xx、空响应）
    Transient,
    /// 速率限制，预期在退避窗口内恢复
    RateLimited,
    /// 额度耗尽，同一计费周期内重试通常无济于事
    Quota,
    /// 致命错误（认证失败、请求格式错误），不重试
    Fatal,
    /// 产物写入失败（磁盘满、权限不足）
    ArtifactWrite,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::MissingUpstream => "missing_upstream",
            ErrorClass::Transient => "transient",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Quota => "quota",
            ErrorClass::Fatal => "fatal",
            ErrorClass::ArtifactWrite => "artifact_write",
        }
    }

    /// 该分类是否进入退避重试
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::Transient | ErrorClass::RateLimited | ErrorClass::Quota
        )
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 外部服务（LLM / TTS / 搜索）错误
    #[error("服务商错误: {0}")]
    Provider(#[from] ProviderError),

    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),

    /// 上游阶段的产物不存在
    #[error("缺少上游产物: {stage} 需要 {}", expected.display())]
    MissingUpstream { stage: Stage, expected: PathBuf },

    /// 上游阶段的产物存在但内容为空
    #[error("上游产物为空: {stage} 读取到空文件 {}", path.display())]
    UpstreamEmpty { stage: Stage, path: PathBuf },

    /// 重试次数用尽，保留最后一次错误
    #[error("重试 {attempts} 次后仍失败: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 凭据缺失
    #[error("环境变量 {var_name} 未设置")]
    MissingCredential { var_name: String },

    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },

    /// 阶段选择非法
    #[error("阶段选择 '{input}' 无效: {reason}")]
    InvalidStageSelection { input: String, reason: String },

    /// 名称清洗后为空或不可用作路径段
    #[error("{field} '{raw}' 清洗后无法作为文件名")]
    InvalidName { field: String, raw: String },

    /// 轨道定义非法
    #[error("轨道定义无效 ({field}): {reason}")]
    InvalidTrack { field: String, reason: String },

    /// 选项取值非法
    #[error("选项 {field} 无效: {reason}")]
    InvalidOption { field: String, reason: String },

    /// 提示词模板不存在
    #[error("提示词模板 {kind}/{version} 不存在，可用版本: [{}]", available.join(", "))]
    PromptNotFound {
        kind: String,
        version: String,
        available: Vec<String>,
    },
}

/// 服务商错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 认证失败（401 / 403 / 无效密钥）
    Auth,
    /// 请求格式错误（400 等）
    BadRequest,
    /// 速率限制（429）
    RateLimited,
    /// 额度耗尽
    QuotaExhausted,
    /// 网络或服务端临时故障
    Network,
    /// 服务返回了空结果
    EmptyResponse,
}

/// 服务商错误
#[derive(Debug, Error)]
#[error("{provider} [{kind:?}{}]: {message}", status.map(|s| format!(" HTTP {s}")).unwrap_or_default())]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {}", path.display())]
    NotFound { path: PathBuf },

    /// 读取文件失败
    #[error("读取文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 写入文件失败
    #[error("写入文件失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 解析失败（TOML / JSON）
    #[error("解析文件失败 ({}): {source}", path.display())]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 序列化失败
    #[error("序列化失败 ({}): {source}", path.display())]
    SerializeFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AppError {
    /// 错误分类
    ///
    /// `RetriesExhausted` 透传内部错误的分类，外层包装不改变分类。
    pub fn classification(&self) -> ErrorClass {
        match self {
            AppError::Config(_) => ErrorClass::Configuration,
            AppError::Provider(e) => match e.kind {
                ProviderErrorKind::Auth | ProviderErrorKind::BadRequest => ErrorClass::Fatal,
                ProviderErrorKind::RateLimited => ErrorClass::RateLimited,
                ProviderErrorKind::QuotaExhausted => ErrorClass::Quota,
                ProviderErrorKind::Network | ProviderErrorKind::EmptyResponse => {
                    ErrorClass::Transient
                }
            },
            AppError::File(e) => match e {
                FileError::WriteFailed { .. } | FileError::SerializeFailed { .. } => {
                    ErrorClass::ArtifactWrite
                }
                FileError::NotFound { .. }
                | FileError::ReadFailed { .. }
                | FileError::ParseFailed { .. } => ErrorClass::Configuration,
            },
            AppError::MissingUpstream { .. } | AppError::UpstreamEmpty { .. } => {
                ErrorClass::MissingUpstream
            }
            AppError::RetriesExhausted { source, .. } => source.classification(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.classification().is_retryable()
    }

    /// 面向用户的处理建议
    pub fn remediation_hint(&self) -> Option<String> {
        match self {
            AppError::RetriesExhausted { source, .. } => source.remediation_hint(),
            AppError::Config(ConfigError::MissingCredential { var_name }) => Some(format!(
                "请在 .env 文件或环境变量中设置 {var_name}；dry-run 模式不需要任何密钥"
            )),
            AppError::Config(ConfigError::PromptNotFound { .. }) => {
                Some("使用 `audio-guide prompts` 查看可用的提示词版本".to_string())
            }
            AppError::MissingUpstream { stage, .. } | AppError::UpstreamEmpty { stage, .. } => {
                stage.upstream().map(|up| {
                    format!(
                        "请先运行第 {} 阶段（{}），或在 --stages 中包含它",
                        up.number(),
                        up.name()
                    )
                })
            }
            other => match other.classification() {
                ErrorClass::Quota => Some(
                    "API 额度已用尽，同一计费周期内重试无效：请检查账户余额与计费设置，或等待额度重置后再运行"
                        .to_string(),
                ),
                ErrorClass::RateLimited => Some(
                    "触发速率限制：稍后再试，或调大 --max-wait / --max-retries".to_string(),
                ),
                ErrorClass::Fatal => Some("请检查 API 密钥、模型名称与请求参数".to_string()),
                ErrorClass::ArtifactWrite => Some("请检查输出目录的磁盘空间与写入权限".to_string()),
                _ => None,
            },
        }
    }

    /// 报告中使用的单行摘要
    pub fn summary(&self) -> String {
        format!("[{}] {}", self.classification(), self)
    }

    // ========== 便捷构造函数 ==========

    pub fn missing_credential(var_name: impl Into<String>) -> Self {
        AppError::Config(ConfigError::MissingCredential {
            var_name: var_name.into(),
        })
    }

    pub fn invalid_option(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidOption {
            field: field.into(),
            reason: reason.into(),
        })
    }

    pub fn invalid_track(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidTrack {
            field: field.into(),
            reason: reason.into(),
        })
    }

    pub fn read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return AppError::File(FileError::NotFound { path });
        }
        AppError::File(FileError::ReadFailed { path, source })
    }

    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
