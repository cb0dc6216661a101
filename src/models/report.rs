//! 批量运行报告
//!
//! 批次开始时创建空报告，每个条目结束后追加一条记录，结束（或中止）时持久化一次。

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorClass};
use crate::models::stage::{RunMode, Stage, StageSelection};
use crate::models::track::TrackDefinition;

/// 条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
    Skipped,
}

/// 单个条目的执行记录
#[derive(Debug, Clone, Serialize)]
pub struct ItemRecord {
    pub output_name: String,
    pub keyword: String,
    pub status: ItemStatus,
    /// 成功时为最后一个执行阶段的产物路径
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    /// 失败时出错的阶段；选项校验失败时为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    pub started_at: DateTime<Local>,
    pub completed_at: DateTime<Local>,
}

impl ItemRecord {
    pub fn success(
        output_name: &str,
        keyword: &str,
        artifact_path: &Path,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            output_name: output_name.to_string(),
            keyword: keyword.to_string(),
            status: ItemStatus::Success,
            artifact_path: Some(artifact_path.to_string_lossy().to_string()),
            stage: None,
            error: None,
            error_class: None,
            started_at,
            completed_at: Local::now(),
        }
    }

    pub fn failed(
        output_name: &str,
        keyword: &str,
        stage: Option<Stage>,
        error: &AppError,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            output_name: output_name.to_string(),
            keyword: keyword.to_string(),
            status: ItemStatus::Failed,
            artifact_path: None,
            stage,
            error: Some(error.to_string()),
            error_class: Some(error.classification()),
            started_at,
            completed_at: Local::now(),
        }
    }

    pub fn skipped(output_name: &str, keyword: &str) -> Self {
        let now = Local::now();
        Self {
            output_name: output_name.to_string(),
            keyword: keyword.to_string(),
            status: ItemStatus::Skipped,
            artifact_path: None,
            stage: None,
            error: None,
            error_class: None,
            started_at: now,
            completed_at: now,
        }
    }
}

/// 批量运行报告
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub track_name: String,
    pub description: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub mode: RunMode,
    pub stages: Vec<u8>,
    pub started_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
    pub duration_seconds: f64,
    /// 轨道中的条目总数（不是已尝试数）
    pub total_files: usize,
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files: Vec<ItemRecord>,
}

impl RunReport {
    /// 为一条轨道创建空报告
    pub fn start(track: &TrackDefinition, mode: RunMode, stages: &StageSelection) -> Self {
        Self {
            track_name: track.track_name.clone(),
            description: track.description.clone().unwrap_or_default(),
            metadata: track.metadata.clone(),
            mode,
            stages: stages.numbers(),
            started_at: Local::now(),
            completed_at: None,
            duration_seconds: 0.0,
            total_files: track.files.len(),
            attempted: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            files: Vec::new(),
        }
    }

    /// 追加一条记录并更新计数
    pub fn record(&mut self, item: ItemRecord) {
        match item.status {
            ItemStatus::Success => {
                self.attempted += 1;
                self.successful += 1;
            }
            ItemStatus::Failed => {
                self.attempted += 1;
                self.failed += 1;
            }
            ItemStatus::Skipped => self.skipped += 1,
        }
        self.files.push(item);
    }

    /// 写入结束时间与耗时
    pub fn finish(&mut self) {
        let now = Local::now();
        let elapsed = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.duration_seconds = (elapsed * 100.0).round() / 100.0;
        self.completed_at = Some(now);
    }

    pub fn find(&self, output_name: &str) -> Option<&ItemRecord> {
        self.files.iter().find(|r| r.output_name == output_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::track::FileJob;

    #[test]
    fn test_counts_follow_records() {
        let track = TrackDefinition {
            track_name: "t".to_string(),
            files: vec![FileJob::new("a", "1"), FileJob::new("b", "2"), FileJob::new("c", "3")],
            ..Default::default()
        };
        let mut report = RunReport::start(&track, RunMode::Mock, &StageSelection::all());
        let started = Local::now();
        report.record(ItemRecord::success("a", "1", Path::new("x.wav"), started));
        report.record(ItemRecord::skipped("b", "2"));
        report.finish();

        assert_eq!(report.total_files, 3);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.successful, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.completed_at.is_some());
        assert_eq!(report.find("a").unwrap().artifact_path.as_deref(), Some("x.wav"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "mock");
        assert_eq!(json["stages"], serde_json::json!([1, 2, 3]));
        assert_eq!(json["files"][1]["status"], "skipped");
    }
}
