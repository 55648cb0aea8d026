//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use anyhow::Result;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::reporter::BatchSummary;

/// 初始化 tracing 订阅器
///
/// 读取 `RUST_LOG`，未设置时默认 info。重复调用是安全的（测试里会多次调用）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n案例录入日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息，并列出本次批次生效的全部策略项
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 并发录入模式");
    info!("📊 最大并发数: {}", config.max_concurrent_jobs);
    info!("🔁 最大尝试次数: {}", config.max_attempts);
    info!(
        "⏱️ 退避: 基数 {}ms, 上限 {}ms, 抖动 {}",
        config.backoff_base_ms, config.backoff_cap_ms, config.backoff_jitter
    );
    info!("⏳ 字段确认超时: {}ms", config.fill_timeout_ms);
    info!("🧭 执行器: {:?}", config.executor);
    info!("🙈 脱敏规则: {:?}", config.mask_patterns);
    info!("{}", "=".repeat(60));
}

/// 记录加载信息
pub fn log_records_loaded(total: usize, admitted: usize, rejected: usize) {
    info!("✓ 找到 {} 条记录", total);
    info!("📋 校验通过 {} 条，拒绝 {} 条", admitted, rejected);
}

/// 记录运行中的批次进度
pub fn log_progress(summary: &BatchSummary) {
    info!(
        "📦 进度: 成功 {} / 死信 {} / 处理中 {} (共 {})",
        summary.succeeded, summary.dead_lettered, summary.pending, summary.total
    );
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &BatchSummary, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.succeeded, summary.total);
    info!("❌ 死信: {}", summary.dead_lettered);
    info!("🚫 校验拒绝: {}", summary.rejected);
    info!(
        "⚡ 吞吐: {:.2} 条/秒, 平均耗时 {}ms, 中位耗时 {}ms",
        summary.throughput_per_sec, summary.mean_fill_time_ms, summary.median_fill_time_ms
    );
    for bucket in &summary.failure_kinds {
        info!("   - {}: {}", bucket.kind, bucket.count);
    }
    for reason in &summary.top_reasons {
        info!("   · {} ({})", truncate_text(&reason.reason, 80), reason.count);
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
