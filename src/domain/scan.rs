// ==========================================
// 成衣扫码同步系统 - 扫码日志领域模型
// ==========================================
// 结构: ProductionDay → MachineDay → OperatorSession → ScanEvent
// 红线: 扫码事件一经写入不可修改，仅由保留期清理任务删除
// 说明: 仓储边界一次性解码为强类型结构，下游不再做零散校验
// ==========================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 单条扫码事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub barcode_id: String,
    pub timestamp: DateTime<Utc>,
    pub machine_id: String,
    pub operator_id: String,
    pub operator_name: String,
}

/// 操作员上机会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSession {
    pub session_id: String,
    pub operator_id: String,
    pub operator_name: String,
    pub sign_in_at: DateTime<Utc>,
    pub sign_out_at: Option<DateTime<Utc>>,
    pub scans: Vec<ScanEvent>,
}

/// 单机台单日日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDay {
    pub machine_id: String,
    pub sessions: Vec<OperatorSession>,
}

/// 生产日日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionDay {
    pub production_date: NaiveDate,
    pub machines: Vec<MachineDay>,
}

impl ProductionDay {
    /// 当日扫码总数
    pub fn scan_count(&self) -> usize {
        self.machines
            .iter()
            .flat_map(|m| m.sessions.iter())
            .map(|s| s.scans.len())
            .sum()
    }
}
