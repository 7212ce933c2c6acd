// ==========================================
// 成衣扫码同步系统 - 完工快照写入器
// ==========================================
// 职责: 把一次重算结果合并进工单已有快照，并推进状态与时间线
// 两种合并:
// - replace_recomputed: 重算类字段整体替换（整单完成数只增不减）
// - accumulate_invalid: 无效扫码计数累加，历史去重、截断
// 红线: 快照只由本模块产生；写库由编排器完成
// ==========================================

use crate::domain::snapshot::{CompletionSnapshot, InvalidScan};
use crate::domain::types::{OperationStatus, WorkOrderStatus};
use crate::domain::work_order::{WorkOrder, WorkOrderTimeline};
use crate::engine::completion::{advance_status, completion_percentage, CompletionResult};
use crate::engine::efficiency::AnalysisResult;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// 一次重算的完整结果
#[derive(Debug, Clone)]
pub struct Recomputed {
    pub completion: CompletionResult,
    pub analysis: AnalysisResult,
    /// 有效扫码的最早/最晚时间
    pub first_scan_at: DateTime<Utc>,
    pub last_scan_at: DateTime<Utc>,
}

/// 写入器输出: 待持久化的工单同步状态
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedState {
    pub status: WorkOrderStatus,
    pub timeline: WorkOrderTimeline,
    pub snapshot: CompletionSnapshot,
}

// ==========================================
// SnapshotWriter
// ==========================================
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    invalid_history_limit: usize,
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new(crate::domain::DEFAULT_INVALID_HISTORY_LIMIT)
    }
}

impl SnapshotWriter {
    pub fn new(invalid_history_limit: usize) -> Self {
        Self { invalid_history_limit }
    }

    /// 合并一次同步的结果
    ///
    /// # 参数
    /// - recomputed: 无有效扫码时为 None，此时完工字段保持不变
    /// - newly_invalid: 本次首次登记的无效扫码
    /// - now: 同步时间
    pub fn compose(
        &self,
        work_order: &WorkOrder,
        recomputed: Option<Recomputed>,
        newly_invalid: &[InvalidScan],
        now: DateTime<Utc>,
    ) -> SyncedState {
        let mut snapshot = work_order
            .completion
            .clone()
            .unwrap_or_else(|| CompletionSnapshot::empty(now));
        let mut timeline = work_order.timeline.clone();

        if let Some(recomputed) = recomputed {
            timeline.production_started_at = Some(match timeline.production_started_at {
                Some(existing) => existing.min(recomputed.first_scan_at),
                None => recomputed.first_scan_at,
            });
            let last_scan_at = recomputed.last_scan_at;
            self.replace_recomputed(&mut snapshot, work_order.quantity, recomputed);

            let status = advance_status(
                work_order.status,
                snapshot.overall_completed_quantity,
                work_order.quantity,
            );
            if status == WorkOrderStatus::Completed && timeline.completed_at.is_none() {
                timeline.completed_at = Some(last_scan_at);
            }
            self.accumulate_invalid(&mut snapshot, newly_invalid);
            snapshot.last_synced_at = now;
            return SyncedState {
                status,
                timeline,
                snapshot,
            };
        }

        self.accumulate_invalid(&mut snapshot, newly_invalid);
        snapshot.last_synced_at = now;
        SyncedState {
            status: work_order.status,
            timeline,
            snapshot,
        }
    }

    /// 整体替换重算类字段
    ///
    /// 整单完成数取 max(原值, 新值) 并不超过数量；
    /// 工序完成数不低于整单完成数（保留期清理后交集关系仍成立）
    pub fn replace_recomputed(&self, snapshot: &mut CompletionSnapshot, quantity: u32, fresh: Recomputed) {
        let overall = snapshot
            .overall_completed_quantity
            .max(fresh.completion.overall_completed_quantity)
            .min(quantity);

        snapshot.overall_completed_quantity = overall;
        snapshot.overall_completion_percentage = completion_percentage(overall, quantity);
        snapshot.operations = fresh
            .completion
            .operations
            .into_iter()
            .map(|mut op| {
                if op.completed_quantity < overall {
                    op.completed_quantity = overall;
                    op.completion_percentage = completion_percentage(overall, quantity);
                    op.status = OperationStatus::from_progress(overall, quantity);
                }
                op
            })
            .collect();
        snapshot.operator_details = fresh.analysis.operator_details;
        snapshot.efficiency_metrics = fresh.analysis.efficiency_metrics;
        snapshot.time_metrics = fresh.analysis.time_metrics;
    }

    /// 累加无效扫码
    ///
    /// 计数只加本次首次登记的条数；历史按 (条码, 时间) 去重，新→旧，截断到上限
    pub fn accumulate_invalid(&self, snapshot: &mut CompletionSnapshot, newly_registered: &[InvalidScan]) {
        snapshot.invalid_scans_count += newly_registered.len() as u64;

        let mut merged: Vec<InvalidScan> = newly_registered.to_vec();
        merged.extend(snapshot.invalid_scans.drain(..));

        let mut seen = HashSet::new();
        merged.retain(|scan| seen.insert((scan.barcode_id.clone(), scan.timestamp)));
        merged.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.barcode_id.cmp(&b.barcode_id))
        });
        merged.truncate(self.invalid_history_limit);

        snapshot.invalid_scans = merged;
    }
}
