//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责阶段调度与批量处理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `track_runner` - 轨道运行器
//! - 校验轨道定义（Vec<FileJob>）
//! - 合并 defaults 与条目覆盖
//! - 逐条执行，快速失败
//! - 写 batch_report.json
//!
//! ### `pipeline_runner` - 单关键词运行器
//! - 运行前检查（选项、凭据、提示词模板、上游产物）
//! - 失败时指明出错的关键词与阶段
//! - 按依赖顺序执行选中的阶段
//!
//! ## 层次关系
//!
//! ```text
//! track_runner (处理 Vec<FileJob>)
//!     ↓
//! pipeline_runner (处理单个关键词的 1..3 阶段)
//!     ↓
//! workflow::StageFlow (处理单个阶段)
//!     ↓
//! services (能力层：llm / tts / search / prompt / metadata)
//!     ↓
//! infrastructure (基础设施：paths / artifact_store)
//! ```

pub mod pipeline_runner;
pub mod track_runner;

// 重新导出主要类型
pub use pipeline_runner::{run_all, run_stages, PipelineRun, StageFailure};
pub use track_runner::{effective_mode, run_track, TrackFailure, TrackOutcome};
