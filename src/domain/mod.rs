// ==========================================
// 成衣扫码同步系统 - 领域模型层
// ==========================================
// 职责: 定义工单、扫码日志、完工快照等领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod scan;
pub mod snapshot;
pub mod types;
pub mod work_order;

// 重导出核心类型
pub use scan::{MachineDay, OperatorSession, ProductionDay, ScanEvent};
pub use snapshot::{
    CompletionSnapshot, EfficiencyMetric, InvalidScan, OperationCompletion, OperatorDetail,
    SessionWindow, TimeMetric, DEFAULT_INVALID_HISTORY_LIMIT,
};
pub use types::{InvalidScanReason, JobKind, OperationStatus, TickTrigger, WorkOrderStatus};
pub use work_order::{Operation, WorkOrder, WorkOrderTimeline};
