//! 基础设施层
//!
//! 只暴露文件系统能力：路径命名约定与产物读写。

pub mod artifact_store;
pub mod paths;

pub use paths::{OutputLayout, RunScope};
