// ==========================================
// 成衣扫码同步系统 - 领域类型定义
// ==========================================
// 职责: 工单状态、工序状态、无效扫码原因等枚举
// 序列化格式: snake_case (与数据库/看板一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 工单状态 (Work Order Status)
// ==========================================
// 红线: 状态只前进，completed/cancelled 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Pending,    // 待下达
    Ready,      // 已就绪
    Scheduled,  // 已排程
    InProgress, // 生产中
    Paused,     // 暂停
    OnHold,     // 挂起
    Completed,  // 已完工
    Cancelled,  // 已取消
}

impl WorkOrderStatus {
    /// 同步任务需要处理的状态集合
    pub const SYNCABLE: [WorkOrderStatus; 4] = [
        WorkOrderStatus::Ready,
        WorkOrderStatus::Scheduled,
        WorkOrderStatus::InProgress,
        WorkOrderStatus::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Pending => "pending",
            WorkOrderStatus::Ready => "ready",
            WorkOrderStatus::Scheduled => "scheduled",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::Paused => "paused",
            WorkOrderStatus::OnHold => "on_hold",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "pending" => Some(WorkOrderStatus::Pending),
            "ready" => Some(WorkOrderStatus::Ready),
            "scheduled" => Some(WorkOrderStatus::Scheduled),
            "in_progress" => Some(WorkOrderStatus::InProgress),
            "paused" => Some(WorkOrderStatus::Paused),
            "on_hold" => Some(WorkOrderStatus::OnHold),
            "completed" => Some(WorkOrderStatus::Completed),
            "cancelled" => Some(WorkOrderStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否为终态（同步不得回退）
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 工序完工状态 (Operation Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,    // 无有效扫码
    InProgress, // 部分完工
    Completed,  // 全部完工
}

impl OperationStatus {
    /// 由完工件数推导工序状态
    pub fn from_progress(completed: u32, quantity: u32) -> Self {
        if quantity > 0 && completed >= quantity {
            OperationStatus::Completed
        } else if completed > 0 {
            OperationStatus::InProgress
        } else {
            OperationStatus::Pending
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::InProgress => write!(f, "in_progress"),
            OperationStatus::Completed => write!(f, "completed"),
        }
    }
}

// ==========================================
// 无效扫码原因 (Invalid Scan Reason)
// ==========================================
// invalid_format: 条码格式或校验位错误
// exceeds_quantity: 件号超出工单数量
// unknown_operation: 工序号超出工单工序数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidScanReason {
    InvalidFormat,
    ExceedsQuantity,
    UnknownOperation,
}

impl InvalidScanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidScanReason::InvalidFormat => "invalid_format",
            InvalidScanReason::ExceedsQuantity => "exceeds_quantity",
            InvalidScanReason::UnknownOperation => "unknown_operation",
        }
    }
}

impl fmt::Display for InvalidScanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 后台任务类型与触发方式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Sync,      // 完工同步
    Retention, // 扫码日志清理
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Sync => "SYNC",
            JobKind::Retention => "RETENTION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickTrigger {
    Scheduled, // 定时触发
    Manual,    // 人工触发
}

impl TickTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickTrigger::Scheduled => "SCHEDULED",
            TickTrigger::Manual => "MANUAL",
        }
    }
}
