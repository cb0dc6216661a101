//! 流水线选项
//!
//! `PipelineOptions` 是单次运行使用的完整、不可变的选项集合；
//! `OptionOverrides` 是它的全 `Option` 镜像，用于轨道 defaults、文件级覆盖和命令行参数。

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 单次运行的全部阶段选项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOptions {
    /// 第 1、2 阶段使用的文本模型
    pub model: String,
    /// 信息检索提示词版本
    pub info_prompt_version: String,
    /// 讲解词提示词版本
    pub prompt_version: String,
    pub temperature: f32,
    /// TTS 音色
    pub voice: String,
    pub tts_model: String,
    /// 语速（部分服务商不支持）
    pub speed: f32,
    /// 最大尝试次数
    pub max_retries: u32,
    /// 首次退避（秒）
    pub initial_wait: f64,
    /// 退避上限（秒）
    pub max_wait: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            info_prompt_version: "default".to_string(),
            prompt_version: "v2-tts".to_string(),
            temperature: 0.7,
            voice: "Zephyr".to_string(),
            tts_model: "gemini-2.5-pro-preview-tts".to_string(),
            speed: 1.0,
            max_retries: 8,
            initial_wait: 1.0,
            max_wait: 60.0,
        }
    }
}

impl PipelineOptions {
    /// 校验取值范围，在任何外部调用之前执行
    pub fn validate(&self) -> AppResult<()> {
        if self.model.trim().is_empty() {
            return Err(AppError::invalid_option("model", "不能为空"));
        }
        if self.voice.trim().is_empty() {
            return Err(AppError::invalid_option("voice", "不能为空"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::invalid_option(
                "temperature",
                format!("{} 不在 [0, 2] 范围内", self.temperature),
            ));
        }
        if !(self.speed > 0.0) {
            return Err(AppError::invalid_option("speed", "必须大于 0"));
        }
        if self.max_retries == 0 {
            return Err(AppError::invalid_option("max_retries", "至少为 1"));
        }
        if !(self.initial_wait >= 0.0) || !(self.max_wait >= 0.0) {
            return Err(AppError::invalid_option("initial_wait/max_wait", "不能为负数"));
        }
        if self.max_wait < self.initial_wait {
            return Err(AppError::invalid_option(
                "max_wait",
                format!("{} 小于 initial_wait {}", self.max_wait, self.initial_wait),
            ));
        }
        Ok(())
    }
}

/// 选项覆盖
///
/// 所有字段都是可选的。合并是按键的浅覆盖：`file.or(defaults)`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_prompt_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_wait: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait: Option<f64>,
}

impl OptionOverrides {
    /// 逐键合并，`self` 中已有的值优先
    pub fn or(self, fallback: &OptionOverrides) -> OptionOverrides {
        OptionOverrides {
            model: self.model.or_else(|| fallback.model.clone()),
            info_prompt_version: self
                .info_prompt_version
                .or_else(|| fallback.info_prompt_version.clone()),
            prompt_version: self.prompt_version.or_else(|| fallback.prompt_version.clone()),
            temperature: self.temperature.or(fallback.temperature),
            voice: self.voice.or_else(|| fallback.voice.clone()),
            tts_model: self.tts_model.or_else(|| fallback.tts_model.clone()),
            speed: self.speed.or(fallback.speed),
            max_retries: self.max_retries.or(fallback.max_retries),
            initial_wait: self.initial_wait.or(fallback.initial_wait),
            max_wait: self.max_wait.or(fallback.max_wait),
        }
    }

    /// 覆盖到基础选项之上
    pub fn apply_to(self, base: PipelineOptions) -> PipelineOptions {
        PipelineOptions {
            model: self.model.unwrap_or(base.model),
            info_prompt_version: self.info_prompt_version.unwrap_or(base.info_prompt_version),
            prompt_version: self.prompt_version.unwrap_or(base.prompt_version),
            temperature: self.temperature.unwrap_or(base.temperature),
            voice: self.voice.unwrap_or(base.voice),
            tts_model: self.tts_model.unwrap_or(base.tts_model),
            speed: self.speed.unwrap_or(base.speed),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            initial_wait: self.initial_wait.unwrap_or(base.initial_wait),
            max_wait: self.max_wait.unwrap_or(base.max_wait),
        }
    }

    /// 覆盖到默认选项之上
    pub fn resolve(self) -> PipelineOptions {
        self.apply_to(PipelineOptions::default())
    }
}
