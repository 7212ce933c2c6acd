// ==========================================
// 成衣扫码同步系统 - 扫码抽取与校验
// ==========================================
// 职责: 从扫码日志中抽取引用目标工单的扫码，解码并划分 有效/无效
// 规则:
// - 解码失败 → invalid_format（仍按从右向左解析出的短键判断归属）
// - 件号 ∉ [1, N] → exceeds_quantity
// - 工序号 ∉ [1, M] → unknown_operation
// - 机台未分配给该工序 → 静默排除（属于机台上其他并行生产，不记无效）
// - 解码后短键不等于目标短键 → 静默跳过（前缀相同的其他工单）
// - 完全相同的重复事件只计一次（扫码投递不保证恰好一次）
// ==========================================

use crate::domain::scan::ProductionDay;
use crate::domain::snapshot::InvalidScan;
use crate::domain::types::InvalidScanReason;
use crate::domain::work_order::WorkOrder;
use crate::engine::barcode;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

// ==========================================
// 有效扫码树: 工序 → 机台 → 操作员 → 会话
// ==========================================

/// 有效扫码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidScan {
    pub barcode_id: String,
    pub unit: u32,
    pub operation: u32,
    pub timestamp: DateTime<Utc>,
    pub machine_id: String,
    pub operator_id: String,
    pub operator_name: String,
}

/// 会话内的有效扫码（按时间升序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScans {
    pub session_id: String,
    pub sign_in_at: DateTime<Utc>,
    pub sign_out_at: Option<DateTime<Utc>>,
    pub scans: Vec<ValidScan>,
}

/// 操作员在某机台某工序下的全部会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorScans {
    pub operator_id: String,
    pub operator_name: String,
    pub sessions: BTreeMap<String, SessionScans>,
}

/// 机台下: 操作员ID → 扫码
pub type MachineScans = BTreeMap<String, OperatorScans>;

/// 工序下: 机台ID → 扫码
pub type OperationScans = BTreeMap<String, MachineScans>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidScanTree {
    pub operations: BTreeMap<u32, OperationScans>,
}

impl ValidScanTree {
    fn insert(
        &mut self,
        scan: ValidScan,
        session_id: &str,
        sign_in_at: DateTime<Utc>,
        sign_out_at: Option<DateTime<Utc>>,
    ) {
        let operator = self
            .operations
            .entry(scan.operation)
            .or_default()
            .entry(scan.machine_id.clone())
            .or_default()
            .entry(scan.operator_id.clone())
            .or_insert_with(|| OperatorScans {
                operator_id: scan.operator_id.clone(),
                operator_name: scan.operator_name.clone(),
                sessions: BTreeMap::new(),
            });

        let session = operator
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionScans {
                session_id: session_id.to_string(),
                sign_in_at,
                sign_out_at,
                scans: Vec::new(),
            });
        session.scans.push(scan);
    }

    /// 会话内按时间排序（日志已有序，这里兜底）
    fn sort_sessions(&mut self) {
        for machines in self.operations.values_mut() {
            for operators in machines.values_mut() {
                for operator in operators.values_mut() {
                    for session in operator.sessions.values_mut() {
                        session.scans.sort_by(|a, b| {
                            a.timestamp
                                .cmp(&b.timestamp)
                                .then_with(|| a.barcode_id.cmp(&b.barcode_id))
                        });
                    }
                }
            }
        }
    }

    /// 有效扫码总数
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// 遍历全部有效扫码
    pub fn iter(&self) -> impl Iterator<Item = &ValidScan> + '_ {
        self.operations
            .values()
            .flat_map(|machines| machines.values())
            .flat_map(|operators| operators.values())
            .flat_map(|operator| operator.sessions.values())
            .flat_map(|session| session.scans.iter())
    }

    /// 某工序下出现过的件号集合
    pub fn units_for_operation(&self, operation: u32) -> BTreeSet<u32> {
        self.operations
            .get(&operation)
            .map(|machines| {
                machines
                    .values()
                    .flat_map(|operators| operators.values())
                    .flat_map(|operator| operator.sessions.values())
                    .flat_map(|session| session.scans.iter().map(|s| s.unit))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 最早/最晚的有效扫码时间
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut iter = self.iter().map(|s| s.timestamp);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}

/// 抽取结果
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub valid: ValidScanTree,
    pub invalid: Vec<InvalidScan>,
    /// 机台未分配而排除的扫码数
    pub excluded_unassigned: usize,
    /// 短键前缀相同但属于其他工单的扫码数
    pub foreign_skipped: usize,
    /// 折叠掉的重复事件数
    pub duplicates_collapsed: usize,
}

// ==========================================
// ScanExtractor - 扫码抽取器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScanExtractor;

impl ScanExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 抽取并校验工单相关扫码
    ///
    /// # 参数
    /// - work_order: 目标工单（数量、工序、机台分配）
    /// - days: 扫码仓储按短键查询返回的日志
    pub fn extract(&self, work_order: &WorkOrder, days: &[ProductionDay]) -> ExtractionResult {
        let mut result = ExtractionResult::default();
        let mut seen_valid: HashSet<(String, DateTime<Utc>, String)> = HashSet::new();
        let mut seen_invalid: HashSet<(String, DateTime<Utc>)> = HashSet::new();

        for day in days {
            for machine_day in &day.machines {
                for session in &machine_day.sessions {
                    for scan in &session.scans {
                        let make_invalid = |reason: InvalidScanReason, detail: String| InvalidScan {
                            barcode_id: scan.barcode_id.clone(),
                            timestamp: scan.timestamp,
                            production_date: day.production_date,
                            machine_id: scan.machine_id.clone(),
                            operator_id: scan.operator_id.clone(),
                            operator_name: scan.operator_name.clone(),
                            reason,
                            detail,
                        };

                        let decoded = match barcode::decode(&scan.barcode_id) {
                            Ok(decoded) => decoded,
                            Err(e) => {
                                // 段数足够时短键可确定，属于其他工单则不计
                                if barcode::work_order_key_of(&scan.barcode_id)
                                    .is_some_and(|key| key != work_order.work_order_key)
                                {
                                    result.foreign_skipped += 1;
                                    continue;
                                }
                                if seen_invalid.insert((scan.barcode_id.clone(), scan.timestamp)) {
                                    result
                                        .invalid
                                        .push(make_invalid(InvalidScanReason::InvalidFormat, e.to_string()));
                                } else {
                                    result.duplicates_collapsed += 1;
                                }
                                continue;
                            }
                        };

                        if decoded.work_order_key != work_order.work_order_key {
                            result.foreign_skipped += 1;
                            continue;
                        }

                        if decoded.unit < 1 || decoded.unit > work_order.quantity {
                            if seen_invalid.insert((scan.barcode_id.clone(), scan.timestamp)) {
                                result.invalid.push(make_invalid(
                                    InvalidScanReason::ExceedsQuantity,
                                    format!(
                                        "件号 {} 超出工单数量 {}",
                                        decoded.unit, work_order.quantity
                                    ),
                                ));
                            } else {
                                result.duplicates_collapsed += 1;
                            }
                            continue;
                        }

                        let operation = match work_order.operation(decoded.operation) {
                            Some(op) => op,
                            None => {
                                if seen_invalid.insert((scan.barcode_id.clone(), scan.timestamp)) {
                                    result.invalid.push(make_invalid(
                                        InvalidScanReason::UnknownOperation,
                                        format!(
                                            "工序号 {} 超出工单工序数 {}",
                                            decoded.operation,
                                            work_order.operation_count()
                                        ),
                                    ));
                                } else {
                                    result.duplicates_collapsed += 1;
                                }
                                continue;
                            }
                        };

                        if !operation.is_assigned_machine(&scan.machine_id) {
                            result.excluded_unassigned += 1;
                            continue;
                        }

                        let dedup_key = (scan.barcode_id.clone(), scan.timestamp, scan.machine_id.clone());
                        if !seen_valid.insert(dedup_key) {
                            result.duplicates_collapsed += 1;
                            continue;
                        }

                        result.valid.insert(
                            ValidScan {
                                barcode_id: scan.barcode_id.clone(),
                                unit: decoded.unit,
                                operation: decoded.operation,
                                timestamp: scan.timestamp,
                                machine_id: scan.machine_id.clone(),
                                operator_id: scan.operator_id.clone(),
                                operator_name: scan.operator_name.clone(),
                            },
                            &session.session_id,
                            session.sign_in_at,
                            session.sign_out_at,
                        );
                    }
                }
            }
        }

        result.valid.sort_sessions();

        debug!(
            work_order_id = %work_order.work_order_id,
            valid = result.valid.len(),
            invalid = result.invalid.len(),
            excluded_unassigned = result.excluded_unassigned,
            foreign_skipped = result.foreign_skipped,
            duplicates_collapsed = result.duplicates_collapsed,
            "扫码抽取完成"
        );

        result
    }
}
