// ==========================================
// 成衣扫码同步系统 - 工单领域模型
// ==========================================
// 职责: 工单、工序、工单时间线
// 红线: 工单/工序由上游创建，本系统只读写状态、时间线与完工快照
// ==========================================

use crate::domain::snapshot::CompletionSnapshot;
use crate::domain::types::WorkOrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Operation - 工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// 工序序号（从 1 开始，与条码中的 OO 对应）
    pub operation_index: u32,
    /// 工序类型（如 "锁边"、"钉扣"）
    pub operation_type: String,
    /// 主机台
    pub primary_machine_id: String,
    /// 副机台
    pub secondary_machine_ids: Vec<String>,
    /// 计划单件工时（秒）
    pub planned_time_secs: Option<f64>,
    /// 预估单件工时（秒）
    pub estimated_time_secs: Option<f64>,
}

impl Operation {
    /// 机台是否分配给该工序（主或副）
    pub fn is_assigned_machine(&self, machine_id: &str) -> bool {
        self.primary_machine_id == machine_id
            || self.secondary_machine_ids.iter().any(|m| m == machine_id)
    }

    /// 全部分配机台（主机台在前）
    pub fn assigned_machines(&self) -> Vec<String> {
        let mut machines = Vec::with_capacity(1 + self.secondary_machine_ids.len());
        machines.push(self.primary_machine_id.clone());
        for m in &self.secondary_machine_ids {
            if !machines.contains(m) {
                machines.push(m.clone());
            }
        }
        machines
    }

    /// 效率基准工时: 计划工时优先，其次预估工时
    pub fn planned_or_estimated_secs(&self) -> Option<f64> {
        self.planned_time_secs
            .or(self.estimated_time_secs)
            .filter(|v| *v > 0.0)
    }

    /// 单次扫码件的替代工时: 预估工时优先，其次计划工时
    pub fn estimated_or_planned_secs(&self) -> Option<f64> {
        self.estimated_time_secs
            .or(self.planned_time_secs)
            .filter(|v| *v > 0.0)
    }
}

// ==========================================
// WorkOrderTimeline - 工单时间线
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderTimeline {
    pub created_at: Option<DateTime<Utc>>,
    /// 首次有效扫码时间（进入生产中时写入）
    pub production_started_at: Option<DateTime<Utc>>,
    /// 最后一次有效扫码时间（完工时写入）
    pub completed_at: Option<DateTime<Utc>>,
}

// ==========================================
// WorkOrder - 工单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub work_order_id: String,
    /// 条码中嵌入的短键（可含连字符）
    pub work_order_key: String,
    pub work_order_number: String,
    /// 工单数量 N
    pub quantity: u32,
    /// 工序列表（按 operation_index 升序）
    pub operations: Vec<Operation>,
    pub status: WorkOrderStatus,
    pub timeline: WorkOrderTimeline,
    /// 完工快照（首次同步前为空）
    pub completion: Option<CompletionSnapshot>,
}

impl WorkOrder {
    /// 按序号查找工序
    pub fn operation(&self, operation_index: u32) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.operation_index == operation_index)
    }

    pub fn operation_count(&self) -> u32 {
        self.operations.len() as u32
    }
}
