//! 单关键词运行器 - 编排层
//!
//! ## 职责
//! - 按 1 → 2 → 3 的依赖顺序执行选中的阶段，与传入顺序无关
//! - 遇到第一个失败即停止，错误原样向上传递
//! - 未选中的上游阶段只检查产物是否存在，从不隐式执行
//! - 所有配置类检查（选项、凭据、提示词模板、上游产物）都在第一次外部调用之前完成

use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::models::{PipelineOptions, Stage, StageSelection};
use crate::utils::logging;
use crate::workflow::{StageArtifact, StageCtx, StageFlow};

/// 单次运行结果
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// 按执行顺序排列的各阶段产物
    pub artifacts: Vec<StageArtifact>,
    /// 最后一个执行阶段的产物路径
    pub final_path: PathBuf,
}

/// 单次运行失败，记录出错的关键词与阶段
///
/// 内部的 `AppError` 原样保留，分类与建议不受影响。
#[derive(Debug, Error)]
#[error("关键词 '{keyword}' {}失败: {error}", stage_label(.stage))]
pub struct StageFailure {
    pub keyword: String,
    /// 选项校验失败时不属于任何阶段
    pub stage: Option<Stage>,
    #[source]
    pub error: AppError,
}

fn stage_label(stage: &Option<Stage>) -> String {
    stage.map(|s| format!("{s} ")).unwrap_or_default()
}

/// 为一个关键词执行选中的阶段
///
/// # 参数
/// - `flow`: 阶段处理流程
/// - `ctx`: 阶段上下文（关键词、输出名、模式、根目录）
/// - `options`: 合并后的选项
/// - `stages`: 阶段选择
///
/// # 返回
/// 返回各阶段产物与最终产物路径
pub async fn run_all(
    flow: &StageFlow,
    ctx: &StageCtx,
    options: &PipelineOptions,
    stages: &StageSelection,
) -> AppResult<PipelineRun> {
    run_stages(flow, ctx, options, stages)
        .await
        .map_err(|failure| failure.error)
}

/// 与 [`run_all`] 相同，失败时额外给出出错的阶段
pub async fn run_stages(
    flow: &StageFlow,
    ctx: &StageCtx,
    options: &PipelineOptions,
    stages: &StageSelection,
) -> Result<PipelineRun, StageFailure> {
    logging::log_run_start(&ctx.keyword, &stages.to_string(), ctx.mode.as_str());

    let fail = |stage: Option<Stage>, e: AppError| {
        error!("{} ❌ {}失败: {}", ctx, stage_label(&stage), e.summary());
        StageFailure {
            keyword: ctx.keyword.clone(),
            stage,
            error: e,
        }
    };

    options.validate().map_err(|e| fail(None, e))?;
    for stage in stages.iter() {
        preflight(flow, ctx, options, stages, stage)
            .await
            .map_err(|e| fail(Some(stage), e))?;
    }

    let mut artifacts = Vec::new();
    for stage in stages.iter() {
        let artifact = flow
            .run(stage, ctx, options)
            .await
            .map_err(|e| fail(Some(stage), e))?;
        artifacts.push(artifact);
    }

    // 阶段选择不可能为空
    let final_path = artifacts
        .last()
        .map(|a| a.path.clone())
        .unwrap_or_default();

    info!("{} ✅ 完成: {}", ctx, final_path.display());
    Ok(PipelineRun {
        artifacts,
        final_path,
    })
}

/// 运行前检查（单个阶段）
///
/// 若该阶段的上游阶段未被选中，则上游产物必须已经存在；
/// 生产模式下还要确认对应服务的凭据就绪、提示词模板可以加载。
async fn preflight(
    flow: &StageFlow,
    ctx: &StageCtx,
    options: &PipelineOptions,
    stages: &StageSelection,
    stage: Stage,
) -> AppResult<()> {
    if let Some(upstream) = stage.upstream() {
        if !stages.contains(upstream) {
            flow.require_upstream(stage, ctx).await?;
        }
    }
    flow.check_ready(stage, ctx)?;
    flow.check_prompt(stage, ctx, options).await?;
    Ok(())
}
