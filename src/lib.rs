//! # Heritage Audio Guide
//!
//! 文化遗产语音导览生成器：关键词 → 资料 → 讲解词 → 语音
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 只暴露文件系统能力
//! - `paths` - 路径命名约定（三个阶段共享的唯一规则）
//! - `artifact_store` - 原子写入产物
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心阶段顺序
//! - `LlmService` - 文本生成能力
//! - `TtsService` - 语音合成能力
//! - `PromptLoader` - 版本化提示词模板
//! - `metadata` - 产物旁的元数据文件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个阶段"的完整处理流程
//! - `StageCtx` - 上下文封装（keyword + output_name + mode）
//! - `StageFlow` - 阶段实现（读上游 → 调服务 → 写产物）
//! - `retry` - 指数退避重试
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline_runner` - 单关键词运行器，按依赖顺序执行阶段
//! - `orchestrator/track_runner` - 轨道运行器，逐条执行并生成报告
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ErrorClass};
pub use infrastructure::{OutputLayout, RunScope};
pub use models::{PipelineOptions, RunMode, RunReport, Stage, StageSelection, TrackDefinition};
pub use orchestrator::{
    run_all, run_stages, run_track, PipelineRun, StageFailure, TrackFailure, TrackOutcome,
};
pub use workflow::{RetryPolicy, StageCtx, StageFlow};
