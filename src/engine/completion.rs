// ==========================================
// 成衣扫码同步系统 - 完工推断引擎
// ==========================================
// 规则: 某件在某工序下有 >= 1 条有效扫码即视为该工序完成（按出现判定）
// 工序完成数 = 该工序出现过的不同件号数（不超过工单数量）
// 整单完成数 = 所有工序完成件号集合的交集大小
// ==========================================

use crate::domain::snapshot::OperationCompletion;
use crate::domain::types::{OperationStatus, WorkOrderStatus};
use crate::domain::work_order::WorkOrder;
use crate::engine::extractor::ValidScanTree;
use std::collections::BTreeSet;

/// 推断结果
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub operations: Vec<OperationCompletion>,
    pub overall_completed_quantity: u32,
    pub overall_completion_percentage: f64,
}

/// 完工百分比（保留两位小数）
pub fn completion_percentage(completed: u32, quantity: u32) -> f64 {
    if quantity == 0 {
        return 0.0;
    }
    round2(completed as f64 / quantity as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ==========================================
// CompletionInferenceEngine - 完工推断引擎
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CompletionInferenceEngine;

impl CompletionInferenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// 基于有效扫码推断各工序与整单完成数
    pub fn infer(&self, work_order: &WorkOrder, valid: &ValidScanTree) -> CompletionResult {
        let quantity = work_order.quantity;
        let mut intersection: Option<BTreeSet<u32>> = None;
        let mut operations = Vec::with_capacity(work_order.operations.len());

        for operation in &work_order.operations {
            let units = valid.units_for_operation(operation.operation_index);
            let completed = (units.len() as u32).min(quantity);

            operations.push(OperationCompletion {
                operation_index: operation.operation_index,
                operation_type: operation.operation_type.clone(),
                completed_quantity: completed,
                completion_percentage: completion_percentage(completed, quantity),
                status: OperationStatus::from_progress(completed, quantity),
                assigned_machines: operation.assigned_machines(),
            });

            intersection = Some(match intersection {
                None => units,
                Some(acc) => acc.intersection(&units).copied().collect(),
            });
        }

        // 无工序 → 交集为空
        let overall = intersection
            .map(|set| (set.len() as u32).min(quantity))
            .unwrap_or(0);

        CompletionResult {
            operations,
            overall_completed_quantity: overall,
            overall_completion_percentage: completion_percentage(overall, quantity),
        }
    }
}

/// 工单状态推进
///
/// - completed / cancelled 不再变化
/// - 整单完成数 == 工单数量 → completed
/// - 有进度且处于 pending/ready/scheduled → in_progress
/// - paused / on_hold 保持，直到完工
pub fn advance_status(current: WorkOrderStatus, overall_completed: u32, quantity: u32) -> WorkOrderStatus {
    if current.is_terminal() {
        return current;
    }
    if quantity > 0 && overall_completed >= quantity {
        return WorkOrderStatus::Completed;
    }
    match current {
        WorkOrderStatus::Pending | WorkOrderStatus::Ready | WorkOrderStatus::Scheduled
            if overall_completed > 0 =>
        {
            WorkOrderStatus::InProgress
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scan::{MachineDay, OperatorSession, ProductionDay, ScanEvent};
    use crate::domain::work_order::{Operation, WorkOrderTimeline};
    use crate::engine::barcode;
    use crate::engine::extractor::ScanExtractor;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn work_order(quantity: u32, op_count: u32) -> WorkOrder {
        WorkOrder {
            work_order_id: "1".to_string(),
            work_order_key: "WO9".to_string(),
            work_order_number: "WO-9".to_string(),
            quantity,
            operations: (1..=op_count)
                .map(|i| Operation {
                    operation_index: i,
                    operation_type: format!("工序{}", i),
                    primary_machine_id: "M1".to_string(),
                    secondary_machine_ids: vec![],
                    planned_time_secs: None,
                    estimated_time_secs: None,
                })
                .collect(),
            status: WorkOrderStatus::Ready,
            timeline: WorkOrderTimeline::default(),
            completion: None,
        }
    }

    fn tree(wo: &WorkOrder, scans: &[(u32, u32)]) -> ValidScanTree {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let events = scans
            .iter()
            .enumerate()
            .map(|(i, (unit, op))| ScanEvent {
                barcode_id: barcode::encode("WO9", *unit, *op).unwrap(),
                timestamp: base + Duration::minutes(i as i64),
                machine_id: "M1".to_string(),
                operator_id: "OP1".to_string(),
                operator_name: "李四".to_string(),
            })
            .collect();
        let days = vec![ProductionDay {
            production_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            machines: vec![MachineDay {
                machine_id: "M1".to_string(),
                sessions: vec![OperatorSession {
                    session_id: "S1".to_string(),
                    operator_id: "OP1".to_string(),
                    operator_name: "李四".to_string(),
                    sign_in_at: base,
                    sign_out_at: None,
                    scans: events,
                }],
            }],
        }];
        ScanExtractor::new().extract(wo, &days).valid
    }

    #[test]
    fn test_intersection_of_operations() {
        let wo = work_order(4, 2);
        let valid = tree(&wo, &[(1, 1), (2, 1), (3, 1), (1, 2), (3, 2), (4, 2)]);
        let result = CompletionInferenceEngine::new().infer(&wo, &valid);

        assert_eq!(result.operations[0].completed_quantity, 3);
        assert_eq!(result.operations[1].completed_quantity, 3);
        // 交集 {1, 3}
        assert_eq!(result.overall_completed_quantity, 2);
        assert_eq!(result.overall_completion_percentage, 50.0);
        for op in &result.operations {
            assert!(result.overall_completed_quantity <= op.completed_quantity);
        }
    }

    #[test]
    fn test_operation_without_data_zeroes_overall() {
        let wo = work_order(2, 2);
        let valid = tree(&wo, &[(1, 1), (2, 1)]);
        let result = CompletionInferenceEngine::new().infer(&wo, &valid);

        assert_eq!(result.operations[0].status, OperationStatus::Completed);
        assert_eq!(result.operations[1].status, OperationStatus::Pending);
        assert_eq!(result.overall_completed_quantity, 0);
    }

    #[test]
    fn test_repeat_scans_count_once() {
        let wo = work_order(3, 1);
        let valid = tree(&wo, &[(1, 1), (1, 1), (1, 1)]);
        let result = CompletionInferenceEngine::new().infer(&wo, &valid);
        assert_eq!(result.operations[0].completed_quantity, 1);
        assert_eq!(result.operations[0].completion_percentage, 33.33);
    }

    #[test]
    fn test_advance_status() {
        use WorkOrderStatus::*;
        assert_eq!(advance_status(Ready, 0, 5), Ready);
        assert_eq!(advance_status(Ready, 1, 5), InProgress);
        assert_eq!(advance_status(Scheduled, 2, 5), InProgress);
        assert_eq!(advance_status(Paused, 2, 5), Paused);
        assert_eq!(advance_status(Paused, 5, 5), Completed);
        assert_eq!(advance_status(InProgress, 5, 5), Completed);
        assert_eq!(advance_status(Cancelled, 5, 5), Cancelled);
        assert_eq!(advance_status(Completed, 0, 5), Completed);
    }
}
