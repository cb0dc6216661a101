//! LLM 服务 - 业务能力层
//!
//! 只负责"生成文本"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务
//!
//! 第 1 阶段（信息检索）和第 2 阶段（讲解词）都通过 [`TextGenerator`] 调用它，
//! 测试中用计数桩替换。

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ProviderError, ProviderErrorKind};

const PROVIDER: &str = "openai";

/// 一次文本生成请求
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub system: Option<String>,
    pub user: String,
    pub model: String,
    pub temperature: f32,
}

/// 文本生成能力
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 调用前的本地检查（凭据等），不产生任何网络请求
    fn check_ready(&self) -> AppResult<()> {
        Ok(())
    }

    /// 返回去掉首尾空白的生成结果
    async fn generate(&self, request: &TextRequest) -> AppResult<String>;
}

/// LLM 服务
///
/// 职责：
/// - 调用 OpenAI 兼容接口生成文本
/// - 把服务商错误映射为带分类的 `ProviderError`
/// - 不重试（重试由流程层的退避策略负责）
/// - 不关心阶段、路径、运行模式
pub struct LlmService {
    client: Option<Client<OpenAIConfig>>,
    timeout: Duration,
}

impl LlmService {
    /// 创建新的 LLM 服务
    ///
    /// 没有密钥也能创建，真正调用时才报凭据缺失，这样模拟模式完全不需要密钥。
    pub fn new(config: &Config) -> Self {
        let client = config.openai_api_key.as_deref().map(|key| {
            let openai_config = OpenAIConfig::new()
                .with_api_key(key)
                .with_api_base(&config.openai_api_base);
            Client::with_config(openai_config)
        });

        Self {
            client,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn build_messages(request: &TextRequest) -> AppResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = request.system.as_deref() {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(bad_request)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user.as_str())
            .build()
            .map_err(bad_request)?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        Ok(messages)
    }
}

#[async_trait]
impl TextGenerator for LlmService {
    fn check_ready(&self) -> AppResult<()> {
        match self.client {
            Some(_) => Ok(()),
            None => Err(AppError::missing_credential("OPENAI_API_KEY")),
        }
    }

    async fn generate(&self, request: &TextRequest) -> AppResult<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::missing_credential("OPENAI_API_KEY"))?;

        debug!("调用 LLM API，模型: {}", request.model);
        debug!("用户消息长度: {} 字符", request.user.chars().count());

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(Self::build_messages(request)?)
            .temperature(request.temperature)
            .build()
            .map_err(bad_request)?;

        let response = tokio::time::timeout(self.timeout, client.chat().create(chat_request))
            .await
            .map_err(|_| {
                ProviderError::new(
                    PROVIDER,
                    ProviderErrorKind::Network,
                    format!("请求超时（{} 秒）", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                map_openai_error(e)
            })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ProviderError::new(PROVIDER, ProviderErrorKind::EmptyResponse, "LLM 返回内容为空")
            })?;

        Ok(content)
    }
}

fn bad_request(e: OpenAIError) -> ProviderError {
    ProviderError::new(PROVIDER, ProviderErrorKind::BadRequest, e.to_string())
}

fn map_openai_error(e: OpenAIError) -> ProviderError {
    match &e {
        OpenAIError::ApiError(api) => {
            let haystack = format!("{} {:?} {:?}", api.message, api.r#type, api.code);
            ProviderError::new(PROVIDER, classify_api_error(&haystack), api.message.clone())
        }
        _ => ProviderError::new(PROVIDER, ProviderErrorKind::Network, e.to_string()),
    }
}

/// 按错误类型 / 代码 / 消息文本判断错误种类
///
/// OpenAI 兼容接口不返回 HTTP 状态码，只能看 `type` 与 `code`。
pub(crate) fn classify_api_error(text: &str) -> ProviderErrorKind {
    let text = text.to_lowercase();
    if text.contains("insufficient_quota") || text.contains("exceeded your current quota") {
        ProviderErrorKind::QuotaExhausted
    } else if text.contains("rate_limit") || text.contains("rate limit") {
        ProviderErrorKind::RateLimited
    } else if text.contains("invalid_api_key")
        || text.contains("authentication")
        || text.contains("incorrect api key")
        || text.contains("permission")
    {
        ProviderErrorKind::Auth
    } else if text.contains("invalid_request_error")
        || text.contains("model_not_found")
        || text.contains("context_length_exceeded")
    {
        ProviderErrorKind::BadRequest
    } else {
        ProviderErrorKind::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_classify_api_error() {
        assert_eq!(
            classify_api_error("You exceeded your current quota Some(\"insufficient_quota\")"),
            ProviderErrorKind::QuotaExhausted
        );
        assert_eq!(
            classify_api_error("Rate limit reached for gpt-4.1 Some(\"requests\") Some(\"rate_limit_exceeded\")"),
            ProviderErrorKind::RateLimited
        );
        assert_eq!(
            classify_api_error("Incorrect API key provided Some(\"invalid_request_error\") Some(\"invalid_api_key\")"),
            ProviderErrorKind::Auth
        );
        assert_eq!(
            classify_api_error("The model does not exist Some(\"invalid_request_error\") Some(\"model_not_found\")"),
            ProviderErrorKind::BadRequest
        );
        assert_eq!(
            classify_api_error("The server had an error Some(\"server_error\") None"),
            ProviderErrorKind::Network
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_call() {
        let service = LlmService::new(&Config::default());
        let request = TextRequest {
            system: None,
            user: "경복궁".to_string(),
            model: "gpt-4.1".to_string(),
            temperature: 0.7,
        };

        assert!(service.check_ready().is_err());
        let err = service.generate(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.classification(), ErrorClass::Configuration);
    }

    /// 真实 API 调用，需要 OPENAI_API_KEY
    ///
    /// 运行方式：
    /// ```bash
    /// cargo test test_generate_live -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_generate_live() {
        let _ = dotenvy::dotenv();
        let _ = tracing_subscriber::fmt::try_init();

        let service = LlmService::new(&Config::from_env().unwrap());
        let request = TextRequest {
            system: Some("你是一个简洁的助手，回答要简短。".to_string()),
            user: "불국사를 한 문장으로 소개해 주세요.".to_string(),
            model: "gpt-4.1".to_string(),
            temperature: 0.3,
        };

        let response = service.generate(&request).await.unwrap();
        println!("\n========== LLM 响应 ==========\n{}\n", response);
        assert!(!response.is_empty());
    }
}
