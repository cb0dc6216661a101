//! 集成测试共用的桩实现
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use heritage_audio_guide::error::{AppError, AppResult, ProviderError, ProviderErrorKind};
use heritage_audio_guide::services::tts_service;
use heritage_audio_guide::services::{
    PromptLoader, SearchHit, SpeechRequest, SpeechSynthesizer, TextGenerator, TextRequest,
    WebSearch,
};
use heritage_audio_guide::{PipelineOptions, StageFlow};

/// 可编排失败的文本生成桩
#[derive(Default)]
pub struct StubText {
    pub calls: AtomicU32,
    /// 前 N 次调用返回网络错误
    pub transient_failures: u32,
    /// 用户提示词包含该片段时返回认证错误（不可重试）
    pub fatal_marker: Option<String>,
    /// 模拟缺少密钥
    pub missing_key: bool,
    /// 收到的用户提示词
    pub prompts: Mutex<Vec<String>>,
}

impl StubText {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for StubText {
    fn check_ready(&self) -> AppResult<()> {
        if self.missing_key {
            return Err(AppError::missing_credential("OPENAI_API_KEY"));
        }
        Ok(())
    }

    async fn generate(&self, request: &TextRequest) -> AppResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(request.user.clone());
        if let Some(marker) = &self.fatal_marker {
            if request.user.contains(marker.as_str()) {
                return Err(ProviderError::new("stub", ProviderErrorKind::Auth, "invalid key")
                    .with_status(401)
                    .into());
            }
        }
        if n <= self.transient_failures {
            return Err(ProviderError::new("stub", ProviderErrorKind::Network, "connection reset").into());
        }
        Ok(format!("# 생성된 문서 {n}\n\n{}", request.user.lines().next().unwrap_or_default()))
    }
}

/// 语音合成桩，返回一段很短的静音 WAV
#[derive(Default)]
pub struct StubSpeech {
    pub calls: AtomicU32,
}

impl StubSpeech {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSpeech {
    async fn synthesize(&self, _request: &SpeechRequest) -> AppResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(tts_service::silent_wav(10))
    }
}

/// 网页搜索桩，`fail` 为真时返回网络错误
#[derive(Default)]
pub struct StubSearch {
    pub calls: AtomicU32,
    pub hits: Vec<SearchHit>,
    pub fail: bool,
}

impl StubSearch {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(&self, _query: &str) -> AppResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::new("search", ProviderErrorKind::Network, "timeout").into());
        }
        Ok(self.hits.clone())
    }
}

pub fn stub_flow(text: &Arc<StubText>, speech: &Arc<StubSpeech>, root: &Path) -> StageFlow {
    StageFlow::with_capabilities(
        text.clone(),
        speech.clone(),
        PromptLoader::new(root.join("prompts")),
    )
}

/// 不等待的重试选项
pub fn fast_options(max_retries: u32) -> PipelineOptions {
    PipelineOptions {
        max_retries,
        initial_wait: 0.0,
        max_wait: 0.0,
        ..PipelineOptions::default()
    }
}
