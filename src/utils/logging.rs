/// 日志工具模块
///
/// 提供日志初始化和文本截断的辅助函数
use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志
///
/// `RUST_LOG` 优先；未设置时默认 `info`，`verbose` 为真时为 `debug`。
/// 重复初始化会返回错误，调用方可忽略。
pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("无法构建日志过滤器")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("日志初始化失败: {}", e))?;

    Ok(())
}

/// 记录会话启动信息
pub fn log_startup(user_id: &str, model: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 复习助手会话启动");
    info!("👤 用户: {}", user_id);
    info!("🤖 模型: {}", model);
    info!(
        "🕒 时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 超长时返回前 `max_len` 个字符加 "..."
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
