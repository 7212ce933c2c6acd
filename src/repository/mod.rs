// ==========================================
// 成衣扫码同步系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod row_codec;
pub mod scan_repo;
pub mod sync_run_repo;
pub mod work_order_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use scan_repo::{ScanLogRepository, ScanPurgeStats};
pub use sync_run_repo::{RunCompletion, RunStatus, SyncRunEntity, SyncRunRepository};
pub use work_order_repo::{SaveOutcome, SyncStateWrite, WorkOrderRepository};
