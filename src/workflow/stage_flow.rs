//! 阶段处理流程 - 流程层
//!
//! 核心职责：定义三个阶段各自"读什么、调什么、写什么"
//!
//! 1. info：关键词 →（可选搜索）→ LLM → `info/<slug>.md`
//! 2. script：`info/<slug>.md` → LLM → `script/<slug>_script.md`
//! 3. audio：`script/<slug>_script.md` → TTS → `audio/<slug>.wav`
//!
//! 模拟模式不调用任何服务，直接写占位产物，但同样检查上游产物是否存在。

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::artifact_store;
use crate::models::{PipelineOptions, Stage};
use crate::services::metadata::{self, ArtifactMetadata};
use crate::services::search_service::{self, WebSearch};
use crate::services::tts_service::{self, SpeechRequest, SpeechSynthesizer};
use crate::services::{LlmService, PromptKind, PromptLoader, TextGenerator, TextRequest, TtsService};
use crate::utils::truncate_text;
use crate::workflow::retry::{with_retry, RetryPolicy};
use crate::workflow::stage_ctx::StageCtx;

const MAX_SEARCH_HITS: usize = 5;
const MOCK_AUDIO_MS: u32 = 1_000;

/// 阶段产物
#[derive(Debug, Clone)]
pub struct StageArtifact {
    pub stage: Stage,
    /// 规范路径，与 `StageCtx::artifact_path` 一致
    pub path: PathBuf,
    pub metadata: ArtifactMetadata,
    /// 元数据写入失败时为 `None`
    pub metadata_path: Option<PathBuf>,
}

/// 阶段处理流程
///
/// - 持有三种外部能力（文本、语音、可选搜索），全部可替换
/// - 所有路径都从 `StageCtx` 取得，不自行拼接
/// - 生产模式下的外部调用都包在退避重试里
pub struct StageFlow {
    text: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    search: Option<Arc<dyn WebSearch>>,
    prompts: PromptLoader,
}

impl StageFlow {
    /// 用真实服务创建
    pub fn new(config: &Config) -> AppResult<Self> {
        Ok(Self {
            text: Arc::new(LlmService::new(config)),
            speech: Arc::new(TtsService::new(config)?),
            search: None,
            prompts: PromptLoader::new(&config.prompt_dir),
        })
    }

    /// 用指定的能力实现创建
    pub fn with_capabilities(
        text: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        prompts: PromptLoader,
    ) -> Self {
        Self {
            text,
            speech,
            search: None,
            prompts,
        }
    }

    /// 为第 1 阶段挂上网页搜索
    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// 执行单个阶段
    pub async fn run(
        &self,
        stage: Stage,
        ctx: &StageCtx,
        options: &PipelineOptions,
    ) -> AppResult<StageArtifact> {
        match stage {
            Stage::Info => self.info(ctx, options).await,
            Stage::Script => self.script(ctx, options).await,
            Stage::Audio => self.audio(ctx, options).await,
        }
    }

    /// 生产模式下，检查某阶段所需的服务是否就绪（不发请求）
    pub fn check_ready(&self, stage: Stage, ctx: &StageCtx) -> AppResult<()> {
        if ctx.mode.is_mock() {
            return Ok(());
        }
        match stage {
            Stage::Info | Stage::Script => self.text.check_ready(),
            Stage::Audio => self.speech.check_ready(),
        }
    }

    /// 生产模式下，确认某阶段要用的提示词模板可以加载（不发请求）
    pub async fn check_prompt(
        &self,
        stage: Stage,
        ctx: &StageCtx,
        options: &PipelineOptions,
    ) -> AppResult<()> {
        if ctx.mode.is_mock() {
            return Ok(());
        }
        match stage {
            Stage::Info => {
                self.prompts
                    .load(PromptKind::Info, &options.info_prompt_version)
                    .await?;
            }
            Stage::Script => {
                self.prompts
                    .load(PromptKind::Script, &options.prompt_version)
                    .await?;
            }
            Stage::Audio => {}
        }
        Ok(())
    }

    /// 检查上游产物存在，返回其路径
    ///
    /// 第 1 阶段没有上游，返回 `None`。
    pub async fn require_upstream(&self, stage: Stage, ctx: &StageCtx) -> AppResult<Option<PathBuf>> {
        let Some(upstream) = stage.upstream() else {
            return Ok(None);
        };
        let expected = ctx.artifact_path(upstream)?;
        if !artifact_store::exists(&expected).await {
            return Err(AppError::MissingUpstream { stage, expected });
        }
        Ok(Some(expected))
    }

    /// 读取上游产物的文本内容，空文件视为缺失
    async fn read_upstream(&self, stage: Stage, ctx: &StageCtx) -> AppResult<String> {
        let Some(path) = self.require_upstream(stage, ctx).await? else {
            return Ok(String::new());
        };
        let content = artifact_store::read_text(&path).await?;
        if content.trim().is_empty() {
            return Err(AppError::UpstreamEmpty { stage, path });
        }
        Ok(content)
    }

    // ========== 阶段 1：信息检索 ==========

    pub async fn info(&self, ctx: &StageCtx, options: &PipelineOptions) -> AppResult<StageArtifact> {
        let stage = Stage::Info;
        let path = ctx.artifact_path(stage)?;
        info!("{} 🔍 第1阶段：信息检索", ctx);

        if ctx.mode.is_mock() {
            let body = mock_info(&ctx.keyword);
            return self.persist(stage, ctx, path, body.into_bytes(), None).await;
        }

        self.check_ready(stage, ctx)?;
        let template = self
            .prompts
            .load(PromptKind::Info, &options.info_prompt_version)
            .await?;

        let search_context = self.search_context(ctx).await;
        let mut values = vec![("keyword", ctx.keyword.as_str())];
        if let Some(search) = search_context.as_deref() {
            values.push(("search_context", search));
        }
        let request = TextRequest {
            system: template.system().map(str::to_string),
            user: template.format_user_prompt(&values)?,
            model: options.model.clone(),
            temperature: options.temperature,
        };

        let policy = RetryPolicy::from_options(options);
        let content = with_retry(&policy, "信息检索", || self.text.generate(&request)).await?;
        info!("{} ✓ 信息检索完成: {} 字符", ctx, content.chars().count());

        let meta = |m: ArtifactMetadata| {
            m.with_model(&options.model)
                .with_prompt_version(&options.info_prompt_version)
        };
        self.persist(stage, ctx, path, content.into_bytes(), Some(&meta))
            .await
    }

    /// 搜索失败只降级，不中断
    async fn search_context(&self, ctx: &StageCtx) -> Option<String> {
        let search = self.search.as_ref()?;
        match search.search(&ctx.keyword).await {
            Ok(hits) => {
                info!("{} 🌐 搜索到 {} 条结果", ctx, hits.len());
                search_service::format_search_context(&hits, MAX_SEARCH_HITS)
            }
            Err(e) => {
                warn!("{} ⚠️ 网页搜索失败，仅使用 LLM: {}", ctx, e);
                None
            }
        }
    }

    // ========== 阶段 2：讲解词生成 ==========

    pub async fn script(&self, ctx: &StageCtx, options: &PipelineOptions) -> AppResult<StageArtifact> {
        let stage = Stage::Script;
        let path = ctx.artifact_path(stage)?;
        info!("{} ✍️ 第2阶段：讲解词生成", ctx);

        if ctx.mode.is_mock() {
            self.require_upstream(stage, ctx).await?;
            let body = mock_script(&ctx.keyword, &options.prompt_version);
            return self.persist(stage, ctx, path, body.into_bytes(), None).await;
        }

        let info_content = self.read_upstream(stage, ctx).await?;
        self.check_ready(stage, ctx)?;
        let template = self
            .prompts
            .load(PromptKind::Script, &options.prompt_version)
            .await?;

        let request = TextRequest {
            system: template.system().map(str::to_string),
            user: template.format_user_prompt(&[
                ("keyword", ctx.keyword.as_str()),
                ("info_content", info_content.as_str()),
            ])?,
            model: options.model.clone(),
            temperature: options.temperature,
        };

        let policy = RetryPolicy::from_options(options);
        let script = with_retry(&policy, "讲解词生成", || self.text.generate(&request)).await?;
        info!(
            "{} ✓ 讲解词生成完成: {}",
            ctx,
            truncate_text(&script, 40)
        );

        let meta = |m: ArtifactMetadata| {
            m.with_model(&options.model)
                .with_prompt_version(&options.prompt_version)
        };
        self.persist(stage, ctx, path, script.into_bytes(), Some(&meta))
            .await
    }

    // ========== 阶段 3：语音合成 ==========

    pub async fn audio(&self, ctx: &StageCtx, options: &PipelineOptions) -> AppResult<StageArtifact> {
        let stage = Stage::Audio;
        let path = ctx.artifact_path(stage)?;
        info!("{} 🎤 第3阶段：语音合成", ctx);

        if ctx.mode.is_mock() {
            self.require_upstream(stage, ctx).await?;
            let wav = tts_service::silent_wav(MOCK_AUDIO_MS);
            return self.persist(stage, ctx, path, wav, None).await;
        }

        let script = self.read_upstream(stage, ctx).await?;
        self.check_ready(stage, ctx)?;

        let request = SpeechRequest {
            text: script.trim().to_string(),
            voice: options.voice.clone(),
            model: options.tts_model.clone(),
            speed: options.speed,
        };

        let policy = RetryPolicy::from_options(options);
        let wav = with_retry(&policy, "语音合成", || self.speech.synthesize(&request)).await?;
        info!("{} ✓ 语音合成完成: {} 字节", ctx, wav.len());

        let meta = |m: ArtifactMetadata| m.with_model(&options.tts_model).with_voice(&options.voice);
        self.persist(stage, ctx, path, wav, Some(&meta)).await
    }

    /// 原子写入产物并写元数据
    async fn persist(
        &self,
        stage: Stage,
        ctx: &StageCtx,
        path: PathBuf,
        bytes: Vec<u8>,
        enrich: Option<&dyn Fn(ArtifactMetadata) -> ArtifactMetadata>,
    ) -> AppResult<StageArtifact> {
        let size = artifact_store::write_atomic(&path, &bytes).await?;

        let mut meta = ArtifactMetadata::new(&ctx.keyword, ctx.name(), stage, ctx.mode, size);
        if let Some(enrich) = enrich {
            meta = enrich(meta);
        }
        let metadata_path = metadata::write_metadata(&path, &meta).await;

        info!("{} 💾 已保存: {}", ctx, path.display());
        Ok(StageArtifact {
            stage,
            path,
            metadata: meta,
            metadata_path,
        })
    }
}

fn mock_info(keyword: &str) -> String {
    format!(
        "# {keyword}\n\n\
         > [MOCK] 모의 실행으로 생성된 자리표시자 문서입니다. 실제 API 는 호출되지 않았습니다.\n\n\
         ## 개요\n'{keyword}'에 대한 테스트용 목업 데이터입니다.\n\n\
         ## 역사 및 배경\n- 시대: (목업)\n\n\
         ## 주요 특징\n- 특징: (목업)\n\n\
         ## 참고 자료\n- (목업)\n"
    )
}

fn mock_script(keyword: &str, prompt_version: &str) -> String {
    format!(
        "[MOCK] 프롬프트 버전 {prompt_version} 모의 실행 원고입니다.\n\n\
         안녕하세요. 지금부터 {keyword}에 대해 소개해 드리겠습니다.\n"
    )
}
