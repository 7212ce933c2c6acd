// ==========================================
// 成衣扫码同步系统 - 服务主入口
// ==========================================
// 启动同步与扫码日志清理两个后台循环，Ctrl-C 退出
// ==========================================

use garment_scan_sync::app::{get_default_db_path, AppState};
use garment_scan_sync::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", garment_scan_sync::APP_NAME);
    tracing::info!("系统版本: {}", garment_scan_sync::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径（命令行参数优先）
    let db_path = std::env::args()
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path)?;

    let settings = state.sync_api.get_settings().await?;
    if let Err(e) = settings.validate() {
        tracing::warn!(error = %e, "当前调度配置不合法，请通过运维接口修正");
    }
    tracing::info!(
        sync_interval_secs = settings.sync_interval_secs,
        retention_days = settings.retention_days,
        "后台任务启动"
    );

    let tasks = state.spawn_background_tasks();

    tokio::signal::ctrl_c().await?;
    tracing::info!("收到退出信号，停止后台任务");
    tasks.abort();

    Ok(())
}
