// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use garment_scan_sync::domain::scan::{OperatorSession, ScanEvent};
use garment_scan_sync::domain::types::WorkOrderStatus;
use garment_scan_sync::domain::work_order::{Operation, WorkOrder, WorkOrderTimeline};
use garment_scan_sync::engine::barcode;
use garment_scan_sync::repository::ScanLogRepository;

/// 测试基准时间 2026-03-02 08:00:00Z
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

/// 合法条码
pub fn bc(key: &str, unit: u32, operation: u32) -> String {
    barcode::encode(key, unit, operation).unwrap()
}

// ==========================================
// WorkOrder 构建器
// ==========================================

pub struct WorkOrderBuilder {
    work_order_id: String,
    work_order_key: String,
    quantity: u32,
    status: WorkOrderStatus,
    operations: Vec<Operation>,
}

impl WorkOrderBuilder {
    pub fn new(work_order_id: &str, work_order_key: &str) -> Self {
        Self {
            work_order_id: work_order_id.to_string(),
            work_order_key: work_order_key.to_string(),
            quantity: 1,
            status: WorkOrderStatus::Ready,
            operations: Vec::new(),
        }
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn status(mut self, status: WorkOrderStatus) -> Self {
        self.status = status;
        self
    }

    /// 追加工序（序号按追加顺序从 1 开始）
    pub fn operation(mut self, operation_type: &str, primary_machine: &str, planned_secs: Option<f64>) -> Self {
        let operation_index = self.operations.len() as u32 + 1;
        self.operations.push(Operation {
            operation_index,
            operation_type: operation_type.to_string(),
            primary_machine_id: primary_machine.to_string(),
            secondary_machine_ids: Vec::new(),
            planned_time_secs: planned_secs,
            estimated_time_secs: None,
        });
        self
    }

    /// 给最后一道工序追加副机台
    pub fn secondary_machine(mut self, machine_id: &str) -> Self {
        if let Some(op) = self.operations.last_mut() {
            op.secondary_machine_ids.push(machine_id.to_string());
        }
        self
    }

    pub fn build(self) -> WorkOrder {
        WorkOrder {
            work_order_number: format!("WO-{}", self.work_order_id),
            work_order_id: self.work_order_id,
            work_order_key: self.work_order_key,
            quantity: self.quantity,
            operations: self.operations,
            status: self.status,
            timeline: WorkOrderTimeline {
                created_at: Some(base_time() - Duration::days(1)),
                ..Default::default()
            },
            completion: None,
        }
    }
}

// ==========================================
// 扫码日志构建器
// ==========================================

/// 一个操作员会话的扫码序列
pub struct SessionBuilder {
    production_date: NaiveDate,
    machine_id: String,
    session: OperatorSession,
}

impl SessionBuilder {
    pub fn new(session_id: &str, machine_id: &str, operator_id: &str) -> Self {
        Self {
            production_date: base_date(),
            machine_id: machine_id.to_string(),
            session: OperatorSession {
                session_id: session_id.to_string(),
                operator_id: operator_id.to_string(),
                operator_name: format!("操作员{}", operator_id),
                sign_in_at: base_time(),
                sign_out_at: None,
                scans: Vec::new(),
            },
        }
    }

    /// 指定生产日（签到时间同步到当天 08:00）
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        let shift = date.signed_duration_since(self.production_date);
        self.production_date = date;
        self.session.sign_in_at += shift;
        for scan in &mut self.session.scans {
            scan.timestamp += shift;
        }
        self
    }

    pub fn sign_out_after_minutes(mut self, minutes: i64) -> Self {
        self.session.sign_out_at = Some(self.session.sign_in_at + Duration::minutes(minutes));
        self
    }

    /// 签到后第 seconds 秒扫码
    pub fn scan_at(mut self, barcode_id: &str, seconds: i64) -> Self {
        self.session.scans.push(ScanEvent {
            barcode_id: barcode_id.to_string(),
            timestamp: self.session.sign_in_at + Duration::seconds(seconds),
            machine_id: self.machine_id.clone(),
            operator_id: self.session.operator_id.clone(),
            operator_name: self.session.operator_name.clone(),
        });
        self
    }

    pub fn insert(self, repo: &ScanLogRepository) {
        repo.insert_session_with_scans(self.production_date, &self.machine_id, &self.session)
            .unwrap();
    }
}
