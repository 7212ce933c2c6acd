// ==========================================
// 成衣扫码同步系统 - 应用层
// ==========================================
// 职责: 组装仓储/引擎/API，启动后台任务
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, BackgroundTasks};
