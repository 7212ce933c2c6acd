// ==========================================
// 成衣扫码同步系统 - 效率与工时分析
// ==========================================
// 职责: 由有效扫码计算 操作员明细 / 效率指标 / 工时指标
// 口径:
// - 同一会话内按时间排序，取相邻扫码间隔
// - 间隔 >= 休息阈值 视为休息，不计入单件用时
// - 效率 = 基准工时 / 平均单件用时 × 100，封顶
// - 利用率 = 有效间隔之和 / 会话时长之和 × 100，限制在 [0, 100]
// ==========================================

use crate::config::SyncSettings;
use crate::domain::snapshot::{EfficiencyMetric, OperatorDetail, SessionWindow, TimeMetric};
use crate::domain::work_order::{Operation, WorkOrder};
use crate::engine::completion::round2;
use crate::engine::extractor::{OperatorScans, ValidScanTree};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// 分析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub operator_details: Vec<OperatorDetail>,
    pub efficiency_metrics: Vec<EfficiencyMetric>,
    pub time_metrics: Vec<TimeMetric>,
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

// ==========================================
// EfficiencyAnalyzer - 效率分析器
// ==========================================
#[derive(Debug, Clone)]
pub struct EfficiencyAnalyzer {
    break_threshold_secs: f64,
    efficiency_cap_pct: f64,
}

impl Default for EfficiencyAnalyzer {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

impl EfficiencyAnalyzer {
    pub fn new(break_threshold_minutes: u32, efficiency_cap_pct: f64) -> Self {
        Self {
            break_threshold_secs: break_threshold_minutes as f64 * 60.0,
            efficiency_cap_pct,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.break_threshold_minutes, settings.efficiency_cap_pct)
    }

    pub fn analyze(&self, work_order: &WorkOrder, valid: &ValidScanTree) -> AnalysisResult {
        let mut result = AnalysisResult::default();

        for (operation_index, machines) in &valid.operations {
            let operation = match work_order.operation(*operation_index) {
                Some(op) => op,
                None => continue,
            };

            for (machine_id, operators) in machines {
                for operator in operators.values() {
                    result
                        .operator_details
                        .push(self.operator_detail(*operation_index, machine_id, operator));
                    result
                        .efficiency_metrics
                        .push(self.efficiency_metric(operation, machine_id, operator));
                }

                if let Some(metric) = self.time_metric(operation, machine_id, operators.values()) {
                    result.time_metrics.push(metric);
                }
            }
        }

        result
    }

    fn operator_detail(&self, operation_index: u32, machine_id: &str, operator: &OperatorScans) -> OperatorDetail {
        let scans: Vec<_> = operator.sessions.values().flat_map(|s| s.scans.iter()).collect();
        let units: BTreeSet<u32> = scans.iter().map(|s| s.unit).collect();

        OperatorDetail {
            operator_id: operator.operator_id.clone(),
            operator_name: operator.operator_name.clone(),
            operation_index,
            machine_id: machine_id.to_string(),
            scan_count: scans.len() as u32,
            units_scanned: units.len() as u32,
            first_scan_at: scans.iter().map(|s| s.timestamp).min(),
            last_scan_at: scans.iter().map(|s| s.timestamp).max(),
            sessions: operator
                .sessions
                .values()
                .map(|s| SessionWindow {
                    session_id: s.session_id.clone(),
                    sign_in_at: s.sign_in_at,
                    sign_out_at: s.sign_out_at,
                })
                .collect(),
        }
    }

    fn efficiency_metric(&self, operation: &Operation, machine_id: &str, operator: &OperatorScans) -> EfficiencyMetric {
        let mut retained: Vec<f64> = Vec::new();
        let mut wall_clock = 0.0;

        for session in operator.sessions.values() {
            for pair in session.scans.windows(2) {
                let interval = seconds_between(pair[0].timestamp, pair[1].timestamp);
                if interval < self.break_threshold_secs {
                    retained.push(interval);
                }
            }

            let end = session
                .sign_out_at
                .or_else(|| session.scans.last().map(|s| s.timestamp));
            if let Some(end) = end {
                wall_clock += seconds_between(session.sign_in_at, end).max(0.0);
            }
        }

        let retained_sum: f64 = retained.iter().sum();
        let avg = if retained.is_empty() {
            0.0
        } else {
            retained_sum / retained.len() as f64
        };

        let efficiency = match operation.planned_or_estimated_secs() {
            Some(baseline) if avg > 0.0 => (baseline / avg * 100.0).min(self.efficiency_cap_pct),
            _ => 0.0,
        };

        let utilization = if wall_clock > 0.0 {
            (retained_sum / wall_clock * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        EfficiencyMetric {
            operator_id: operator.operator_id.clone(),
            operator_name: operator.operator_name.clone(),
            operation_index: operation.operation_index,
            machine_id: machine_id.to_string(),
            avg_time_per_unit_secs: round2(avg),
            estimated_time_secs: operation.estimated_time_secs,
            planned_time_secs: operation.planned_time_secs,
            efficiency_percentage: round2(efficiency),
            utilization_rate: round2(utilization),
            interval_count: retained.len() as u32,
        }
    }

    /// 工序 × 机台 的单件完成用时
    ///
    /// 同一件有 >= 2 条扫码取首末差；只有 1 条时用预估工时（其次计划工时），都没有则不计样本
    fn time_metric<'a>(
        &self,
        operation: &Operation,
        machine_id: &str,
        operators: impl Iterator<Item = &'a OperatorScans>,
    ) -> Option<TimeMetric> {
        let mut per_unit: BTreeMap<u32, (DateTime<Utc>, DateTime<Utc>, usize)> = BTreeMap::new();
        for operator in operators {
            for scan in operator.sessions.values().flat_map(|s| s.scans.iter()) {
                per_unit
                    .entry(scan.unit)
                    .and_modify(|(first, last, count)| {
                        *first = (*first).min(scan.timestamp);
                        *last = (*last).max(scan.timestamp);
                        *count += 1;
                    })
                    .or_insert((scan.timestamp, scan.timestamp, 1));
            }
        }

        let fallback = operation.estimated_or_planned_secs();
        let samples: Vec<f64> = per_unit
            .values()
            .filter_map(|(first, last, count)| {
                if *count >= 2 {
                    Some(seconds_between(*first, *last))
                } else {
                    fallback
                }
            })
            .collect();

        if samples.is_empty() {
            return None;
        }

        let sum: f64 = samples.iter().sum();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(TimeMetric {
            operation_index: operation.operation_index,
            machine_id: machine_id.to_string(),
            avg_completion_secs: round2(sum / samples.len() as f64),
            min_completion_secs: round2(min),
            max_completion_secs: round2(max),
            sample_size: samples.len() as u32,
        })
    }
}
