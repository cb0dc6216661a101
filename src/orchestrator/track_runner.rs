//! 轨道（批量）运行器 - 编排层
//!
//! ## 职责
//!
//! 1. **整体校验**：轨道名、条目列表、每个条目的关键词与输出名，任何一项不合法都不执行任何条目
//! 2. **逐条执行**：严格按列表顺序，每个条目的选项 = 条目覆盖 ∪ 轨道 defaults ∪ 命令行选项
//! 3. **快速失败**：第一个失败的条目之后的条目不再尝试
//! 4. **报告**：无论成功、中止还是校验失败，都把报告写到 `<track_root>/batch_report.json`；
//!    只有轨道名本身无法作为目录名时才不写
//!
//! 条目之间不并发：同名输出会写同一路径，而路径约定本身不做冲突检测。

use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult, FileError};
use crate::infrastructure::{artifact_store, OutputLayout, RunScope};
use crate::models::{
    ItemRecord, ItemStatus, OptionOverrides, RunMode, RunReport, StageSelection, TrackDefinition,
};
use crate::orchestrator::pipeline_runner::{self, StageFailure};
use crate::utils::logging;
use crate::workflow::{StageCtx, StageFlow};

/// 轨道运行成功
#[derive(Debug)]
pub struct TrackOutcome {
    pub report: RunReport,
    pub report_path: PathBuf,
    /// 轨道输出根目录
    pub track_root: PathBuf,
}

/// 轨道运行失败
///
/// 携带已经执行部分的报告；校验失败时报告中没有条目。
#[derive(Debug, Error)]
#[error("轨道 '{}' 中止: {}{error}", .report.track_name, failed_item_label(.report))]
pub struct TrackFailure {
    pub report: RunReport,
    pub report_path: Option<PathBuf>,
    #[source]
    pub error: AppError,
}

/// 失败条目的描述，例如 `条目 02 (关键词 '불국사') `
fn failed_item_label(report: &RunReport) -> String {
    report
        .files
        .iter()
        .rev()
        .find(|r| r.status == ItemStatus::Failed)
        .map(|r| format!("条目 {} (关键词 '{}') ", r.output_name, r.keyword))
        .unwrap_or_default()
}

/// 轨道的实际运行模式：命令行 `--dry-run` 或轨道 `defaults.dry_run` 任一为真即为模拟
pub fn effective_mode(track: &TrackDefinition, dry_run_flag: bool) -> RunMode {
    RunMode::from_dry_run(dry_run_flag || track.defaults.dry_run)
}

/// 执行一条轨道
///
/// # 参数
/// - `flow`: 阶段处理流程
/// - `track`: 轨道定义
/// - `stages`: 每个条目要执行的阶段
/// - `mode`: 运行模式
/// - `cli_options`: 命令行给出的选项，优先级低于轨道 defaults 与条目覆盖
/// - `output_root`: 输出根目录
///
/// # 返回
/// 成功时返回报告与报告路径；失败时返回 `TrackFailure`，其中的报告已尽量写盘
pub async fn run_track(
    flow: &StageFlow,
    track: &TrackDefinition,
    stages: &StageSelection,
    mode: RunMode,
    cli_options: &OptionOverrides,
    output_root: &Path,
) -> Result<TrackOutcome, TrackFailure> {
    let mut report = RunReport::start(track, mode, stages);

    let jobs = match track.resolve_jobs_with(cli_options) {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("❌ 轨道定义无效，未执行任何条目: {}", e);
            report.finish();
            let report_path = persist_rejected(&report, track, mode, output_root).await;
            return Err(TrackFailure {
                report,
                report_path,
                error: e,
            });
        }
    };

    let (scope, layout) = match prepare_layout(track, mode, output_root).await {
        Ok(v) => v,
        Err(e) => {
            return Err(TrackFailure {
                report,
                report_path: None,
                error: e,
            })
        }
    };

    logging::log_banner(&format!(
        "🎬 轨道开始: {} ({} 个条目, 阶段 {}, 模式 {})",
        track.track_name,
        jobs.len(),
        stages,
        mode
    ));

    let total = jobs.len();
    let mut failure: Option<AppError> = None;

    for job in &jobs {
        logging::log_item_start(job.index, total, &job.output_name, &job.keyword);

        if job.skip {
            info!("⏭️ 已标记 skip，跳过: {}", job.output_name);
            report.record(ItemRecord::skipped(&job.output_name, &job.keyword));
            continue;
        }

        let started_at = Local::now();
        let result = match StageCtx::new(
            &job.keyword,
            Some(&job.output_name),
            mode,
            output_root,
            &scope,
        ) {
            Ok(ctx) => pipeline_runner::run_stages(flow, &ctx, &job.options, stages).await,
            Err(e) => Err(StageFailure {
                keyword: job.keyword.clone(),
                stage: None,
                error: e,
            }),
        };

        match result {
            Ok(run) => {
                info!("✅ [{}/{}] {} 完成", job.index, total, job.output_name);
                report.record(ItemRecord::success(
                    &job.output_name,
                    &job.keyword,
                    &run.final_path,
                    started_at,
                ));
            }
            Err(StageFailure { stage, error: e, .. }) => {
                error!(
                    "❌ [{}/{}] {} 失败: {}",
                    job.index,
                    total,
                    job.output_name,
                    e.summary()
                );
                report.record(ItemRecord::failed(
                    &job.output_name,
                    &job.keyword,
                    stage,
                    &e,
                    started_at,
                ));
                failure = Some(e);
                break;
            }
        }
    }

    report.finish();
    let report_path = layout.report_path();
    let persisted = write_report(&report, &report_path).await;

    logging::print_track_stats(
        &report.track_name,
        report.successful,
        report.failed,
        report.total_files,
        report.duration_seconds,
        &report_path.to_string_lossy(),
    );

    match (failure, persisted) {
        (Some(error), persisted) => {
            if let Err(e) = &persisted {
                warn!("⚠️ 部分报告写入失败: {}", e);
            }
            error!("❌ 轨道中止: {}", track.track_name);
            Err(TrackFailure {
                report,
                report_path: persisted.ok().map(|_| report_path),
                error,
            })
        }
        (None, Err(error)) => Err(TrackFailure {
            report,
            report_path: None,
            error,
        }),
        (None, Ok(())) => Ok(TrackOutcome {
            report,
            report_path,
            track_root: layout.run_root().to_path_buf(),
        }),
    }
}

/// 校验失败时尽量写出空报告；轨道名不可用或写盘失败时返回 `None`
async fn persist_rejected(
    report: &RunReport,
    track: &TrackDefinition,
    mode: RunMode,
    output_root: &Path,
) -> Option<PathBuf> {
    let (_, layout) = prepare_layout(track, mode, output_root).await.ok()?;
    let path = layout.report_path();
    match write_report(report, &path).await {
        Ok(()) => Some(path),
        Err(e) => {
            warn!("⚠️ 报告写入失败: {}", e);
            None
        }
    }
}

async fn prepare_layout(
    track: &TrackDefinition,
    mode: RunMode,
    output_root: &Path,
) -> AppResult<(RunScope, OutputLayout)> {
    let scope = RunScope::track(&track.track_name)?;
    let layout = OutputLayout::new(output_root, mode, &scope);
    layout.create_dirs().await?;
    info!("📁 轨道目录: {}", layout.run_root().display());
    Ok((scope, layout))
}

async fn write_report(report: &RunReport, path: &Path) -> AppResult<()> {
    let json = serde_json::to_string_pretty(report).map_err(|e| FileError::SerializeFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    artifact_store::write_text(path, &json).await?;
    info!("📊 报告已生成: {}", path.display());
    Ok(())
}
