// ==========================================
// 成衣扫码同步系统 - API 层
// ==========================================
// 职责: 看板只读投影与同步运维接口
// ==========================================

pub mod dashboard_api;
pub mod error;
pub mod sync_api;

// 重导出核心类型
pub use dashboard_api::{
    CompletionSummary, DashboardApi, InvalidScanPage, LiveStatus, OperatorPerformance, TimeAnalysis,
};
pub use error::{ApiError, ApiResult};
pub use sync_api::SyncApi;
