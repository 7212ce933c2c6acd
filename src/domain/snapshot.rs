// ==========================================
// 成衣扫码同步系统 - 完工快照领域模型
// ==========================================
// 职责: 定义工单完工快照及其子结构
// 红线: 快照只由 SnapshotWriter 写入；看板只读投影
// ==========================================

use crate::domain::types::{InvalidScanReason, OperationStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 无效扫码历史上限
pub const DEFAULT_INVALID_HISTORY_LIMIT: usize = 100;

// ==========================================
// OperationCompletion - 工序完工
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCompletion {
    pub operation_index: u32,
    pub operation_type: String,
    pub completed_quantity: u32,
    pub completion_percentage: f64,
    pub status: OperationStatus,
    pub assigned_machines: Vec<String>,
}

// ==========================================
// OperatorDetail - 操作员明细 (操作员 × 工序 × 机台)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub session_id: String,
    pub sign_in_at: DateTime<Utc>,
    pub sign_out_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDetail {
    pub operator_id: String,
    pub operator_name: String,
    pub operation_index: u32,
    pub machine_id: String,
    pub scan_count: u32,
    pub units_scanned: u32,
    pub first_scan_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub sessions: Vec<SessionWindow>,
}

// ==========================================
// EfficiencyMetric - 效率指标 (操作员 × 工序 × 机台)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetric {
    pub operator_id: String,
    pub operator_name: String,
    pub operation_index: u32,
    pub machine_id: String,
    /// 平均单件用时（秒，已剔除休息间隔）
    pub avg_time_per_unit_secs: f64,
    pub estimated_time_secs: Option<f64>,
    pub planned_time_secs: Option<f64>,
    pub efficiency_percentage: f64,
    pub utilization_rate: f64,
    /// 参与平均的间隔数
    pub interval_count: u32,
}

// ==========================================
// TimeMetric - 工时指标 (工序 × 机台)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMetric {
    pub operation_index: u32,
    pub machine_id: String,
    pub avg_completion_secs: f64,
    pub min_completion_secs: f64,
    pub max_completion_secs: f64,
    pub sample_size: u32,
}

// ==========================================
// InvalidScan - 无效扫码记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidScan {
    pub barcode_id: String,
    pub timestamp: DateTime<Utc>,
    pub production_date: NaiveDate,
    pub machine_id: String,
    pub operator_id: String,
    pub operator_name: String,
    pub reason: InvalidScanReason,
    pub detail: String,
}

impl InvalidScan {
    /// 去重键 (barcode_id, timestamp)
    pub fn dedup_key(&self) -> (&str, DateTime<Utc>) {
        (self.barcode_id.as_str(), self.timestamp)
    }
}

// ==========================================
// CompletionSnapshot - 完工快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSnapshot {
    pub overall_completed_quantity: u32,
    pub overall_completion_percentage: f64,
    pub operations: Vec<OperationCompletion>,
    pub operator_details: Vec<OperatorDetail>,
    pub efficiency_metrics: Vec<EfficiencyMetric>,
    pub time_metrics: Vec<TimeMetric>,
    /// 最近的无效扫码（新→旧，最多 100 条）
    pub invalid_scans: Vec<InvalidScan>,
    /// 累计无效扫码数（不受历史截断影响）
    pub invalid_scans_count: u64,
    pub last_synced_at: DateTime<Utc>,
}

impl CompletionSnapshot {
    /// 空快照（首次同步时创建）
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            overall_completed_quantity: 0,
            overall_completion_percentage: 0.0,
            operations: Vec::new(),
            operator_details: Vec::new(),
            efficiency_metrics: Vec::new(),
            time_metrics: Vec::new(),
            invalid_scans: Vec::new(),
            invalid_scans_count: 0,
            last_synced_at: now,
        }
    }
}
