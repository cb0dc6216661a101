/// 日志工具模块
///
/// 提供日志初始化和输出格式化的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 默认级别 `info`，`verbose` 时为 `debug`；设置了 `RUST_LOG` 时以它为准。
/// 重复调用无副作用。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "heritage_audio_guide={default_level},audio_guide={default_level},warn"
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 打印分隔横幅
///
/// # 参数
/// - `title`: 横幅标题
pub fn log_banner(title: &str) {
    info!("{}", "=".repeat(60));
    info!("{}", title);
    info!("{}", "=".repeat(60));
}

/// 记录单次运行的启动信息
///
/// # 参数
/// - `keyword`: 关键词
/// - `stages`: 阶段选择（如 `1,2,3`）
/// - `mode`: 运行模式
pub fn log_run_start(keyword: &str, stages: &str, mode: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始生成语音导览: {}", keyword);
    info!("📋 阶段: {} | 模式: {}", stages, mode);
    info!("{}", "=".repeat(60));
}

/// 记录轨道条目开始
///
/// # 参数
/// - `index`: 条目序号（从 1 开始）
/// - `total`: 条目总数
/// - `output_name`: 输出名
/// - `keyword`: 关键词
pub fn log_item_start(index: usize, total: usize, output_name: &str, keyword: &str) {
    info!("\n{}", "─".repeat(60));
    info!("📦 [{}/{}] {}", index, total, output_name);
    info!("🔑 关键词: {}", keyword);
    info!("{}", "─".repeat(60));
}

/// 打印轨道最终统计
///
/// # 参数
/// - `track_name`: 轨道名
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 条目总数
/// - `duration_secs`: 耗时（秒）
/// - `report_path`: 报告路径
pub fn print_track_stats(
    track_name: &str,
    success: usize,
    failed: usize,
    total: usize,
    duration_secs: f64,
    report_path: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 轨道处理完成统计: {}", track_name);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("⏱️ 耗时: {:.1} 秒", duration_secs);
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", report_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
