//! 网页搜索能力
//!
//! 第 1 阶段可选地用搜索结果补充提示词；没有配置搜索或搜索失败时降级为纯 LLM 检索。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::utils::truncate_text;

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 网页搜索能力
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>>;
}

/// 把搜索结果整理成提示词中的参考段落
///
/// # 参数
/// - `hits`: 搜索结果
/// - `max_hits`: 最多保留几条
///
/// # 返回
/// 没有结果时返回 `None`，由模板参数的默认值兜底
pub fn format_search_context(hits: &[SearchHit], max_hits: usize) -> Option<String> {
    if hits.is_empty() {
        return None;
    }

    let lines: Vec<String> = hits
        .iter()
        .take(max_hits)
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{}. {} ({})\n   {}",
                i + 1,
                hit.title,
                hit.url,
                truncate_text(&hit.snippet, 300)
            )
        })
        .collect();
    Some(lines.join("\n"))
}
