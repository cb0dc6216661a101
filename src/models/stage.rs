//! 阶段与运行模式
//!
//! - `Stage`：三个固定顺序的处理阶段
//! - `StageSelection`：本次要执行的阶段子集，迭代时总是按 1 → 2 → 3
//! - `RunMode`：生产 / 模拟

use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ConfigError};

/// 处理阶段
///
/// 派生的 `Ord` 按声明顺序排列，即依赖顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// 第 1 阶段：信息检索
    Info,
    /// 第 2 阶段：讲解词生成
    Script,
    /// 第 3 阶段：语音合成
    Audio,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Info, Stage::Script, Stage::Audio];

    /// 阶段编号（1-based）
    pub fn number(self) -> u8 {
        match self {
            Stage::Info => 1,
            Stage::Script => 2,
            Stage::Audio => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Info => "info",
            Stage::Script => "script",
            Stage::Audio => "audio",
        }
    }

    pub fn from_number(n: u8) -> Option<Stage> {
        match n {
            1 => Some(Stage::Info),
            2 => Some(Stage::Script),
            3 => Some(Stage::Audio),
            _ => None,
        }
    }

    /// 该阶段读取其产物的上游阶段
    pub fn upstream(self) -> Option<Stage> {
        match self {
            Stage::Info => None,
            Stage::Script => Some(Stage::Info),
            Stage::Audio => Some(Stage::Script),
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "第{}阶段({})", self.number(), self.name())
    }
}

/// 阶段选择
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSelection(BTreeSet<Stage>);

impl StageSelection {
    /// 全部三个阶段
    pub fn all() -> Self {
        Self(Stage::ALL.into_iter().collect())
    }

    /// 由阶段列表构造，空列表视为配置错误
    pub fn from_stages(stages: impl IntoIterator<Item = Stage>) -> AppResult<Self> {
        let set: BTreeSet<Stage> = stages.into_iter().collect();
        if set.is_empty() {
            return Err(ConfigError::InvalidStageSelection {
                input: String::new(),
                reason: "至少需要选择一个阶段".to_string(),
            }
            .into());
        }
        Ok(Self(set))
    }

    /// 解析 `"1,2,3"` 形式的阶段列表
    ///
    /// 顺序与重复项不影响结果；非 1/2/3 的值是配置错误。
    pub fn parse(input: &str) -> AppResult<Self> {
        let invalid = |reason: String| ConfigError::InvalidStageSelection {
            input: input.to_string(),
            reason,
        };

        let mut set = BTreeSet::new();
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let stage = part
                .parse::<u8>()
                .ok()
                .and_then(Stage::from_number)
                .ok_or_else(|| invalid(format!("'{part}' 不是有效的阶段编号（只能是 1、2、3）")))?;
            set.insert(stage);
        }

        if set.is_empty() {
            return Err(invalid("至少需要选择一个阶段".to_string()).into());
        }
        Ok(Self(set))
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }

    /// 按依赖顺序迭代
    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        self.0.iter().copied()
    }

    pub fn numbers(&self) -> Vec<u8> {
        self.iter().map(Stage::number).collect()
    }

    pub fn last(&self) -> Option<Stage> {
        self.0.iter().next_back().copied()
    }
}

impl Default for StageSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl Display for StageSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.iter().map(|s| s.number().to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Production,
    /// 不做任何网络调用，写入占位产物
    Mock,
}

impl RunMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            RunMode::Mock
        } else {
            RunMode::Production
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Production => "production",
            RunMode::Mock => "mock",
        }
    }

    pub fn is_mock(self) -> bool {
        self == RunMode::Mock
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orders_and_dedups() {
        let sel = StageSelection::parse("3, 1,3").unwrap();
        assert_eq!(sel.numbers(), vec![1, 3]);
        assert_eq!(sel.to_string(), "1,3");
        assert_eq!(sel.last(), Some(Stage::Audio));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(StageSelection::parse("").is_err());
        assert!(StageSelection::parse(" , ").is_err());
        let err = StageSelection::parse("1,4").unwrap_err();
        assert!(err.to_string().contains("'4'"));
        assert!(StageSelection::parse("a").is_err());
    }

    #[test]
    fn test_upstream_chain() {
        assert_eq!(Stage::Info.upstream(), None);
        assert_eq!(Stage::Script.upstream(), Some(Stage::Info));
        assert_eq!(Stage::Audio.upstream(), Some(Stage::Script));
    }

    #[test]
    fn test_run_mode_strings() {
        assert_eq!(RunMode::from_dry_run(true).as_str(), "mock");
        assert_eq!(RunMode::from_dry_run(false).as_str(), "production");
        assert_eq!(serde_json::to_string(&RunMode::Mock).unwrap(), "\"mock\"");
    }
}
