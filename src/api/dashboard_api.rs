// ==========================================
// 成衣扫码同步系统 - 看板 API
// ==========================================
// 职责: 基于工单最近一次持久化的完工快照提供只读投影
// 说明: 看板不触发重算，展示内容总是附带 last_synced_at
// ==========================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::config::SyncConfigReader;
use crate::domain::snapshot::{
    CompletionSnapshot, EfficiencyMetric, InvalidScan, OperationCompletion, OperatorDetail,
    TimeMetric,
};
use crate::domain::types::{OperationStatus, WorkOrderStatus};
use crate::domain::work_order::WorkOrder;
use crate::repository::WorkOrderRepository;

/// 无效扫码分页上限
pub const MAX_INVALID_PAGE_SIZE: usize = 100;

/// 超过 N 个同步间隔未同步即视为过期
pub const STALE_INTERVAL_FACTOR: i64 = 2;

// ==========================================
// 响应结构
// ==========================================

/// 完工汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub work_order_id: String,
    pub work_order_number: String,
    pub quantity: u32,
    pub status: WorkOrderStatus,
    pub overall_completed_quantity: u32,
    pub overall_completion_percentage: f64,
    pub operation_count: u32,
    pub operations_completed: u32,
    pub invalid_scans_count: u64,
    pub production_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// 操作员表现（明细 + 效率）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorPerformance {
    pub detail: OperatorDetail,
    pub efficiency: Option<EfficiencyMetric>,
}

/// 工时与效率分析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAnalysis {
    pub time_metrics: Vec<TimeMetric>,
    pub efficiency_metrics: Vec<EfficiencyMetric>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// 实时状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    pub work_order_id: String,
    pub status: WorkOrderStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub seconds_since_last_sync: Option<i64>,
    pub sync_interval_secs: u64,
    /// 从未同步，或距上次同步超过 2 个同步间隔
    pub is_stale: bool,
}

/// 无效扫码分页
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidScanPage {
    /// 累计无效扫码数（含已截断的历史）
    pub total: u64,
    /// 可翻阅的历史条数
    pub retained: usize,
    pub page: usize,
    pub page_size: usize,
    pub items: Vec<InvalidScan>,
}

// ==========================================
// DashboardApi - 看板 API
// ==========================================
pub struct DashboardApi {
    work_order_repo: Arc<WorkOrderRepository>,
    config: Arc<dyn SyncConfigReader>,
}

impl DashboardApi {
    /// 创建新的 DashboardApi 实例
    pub fn new(work_order_repo: Arc<WorkOrderRepository>, config: Arc<dyn SyncConfigReader>) -> Self {
        Self {
            work_order_repo,
            config,
        }
    }

    fn load_work_order(&self, work_order_id: &str) -> ApiResult<WorkOrder> {
        if work_order_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("工单ID不能为空".to_string()));
        }
        self.work_order_repo
            .find_by_id(work_order_id)?
            .ok_or_else(|| ApiError::NotFound(format!("工单(id={})不存在", work_order_id)))
    }

    /// 完工汇总
    pub fn get_completion_summary(&self, work_order_id: &str) -> ApiResult<CompletionSummary> {
        let order = self.load_work_order(work_order_id)?;
        let snapshot = order.completion.as_ref();

        Ok(CompletionSummary {
            work_order_id: order.work_order_id.clone(),
            work_order_number: order.work_order_number.clone(),
            quantity: order.quantity,
            status: order.status,
            overall_completed_quantity: snapshot.map_or(0, |s| s.overall_completed_quantity),
            overall_completion_percentage: snapshot.map_or(0.0, |s| s.overall_completion_percentage),
            operation_count: order.operation_count(),
            operations_completed: snapshot.map_or(0, |s| {
                s.operations
                    .iter()
                    .filter(|op| op.status == OperationStatus::Completed)
                    .count() as u32
            }),
            invalid_scans_count: snapshot.map_or(0, |s| s.invalid_scans_count),
            production_started_at: order.timeline.production_started_at,
            completed_at: order.timeline.completed_at,
            last_synced_at: snapshot.map(|s| s.last_synced_at),
        })
    }

    /// 操作员表现（按 工序/机台/操作员 排列）
    pub fn get_operator_performance(&self, work_order_id: &str) -> ApiResult<Vec<OperatorPerformance>> {
        let order = self.load_work_order(work_order_id)?;
        let snapshot = match order.completion {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };

        Ok(snapshot
            .operator_details
            .iter()
            .map(|detail| OperatorPerformance {
                detail: detail.clone(),
                efficiency: snapshot
                    .efficiency_metrics
                    .iter()
                    .find(|m| {
                        m.operator_id == detail.operator_id
                            && m.operation_index == detail.operation_index
                            && m.machine_id == detail.machine_id
                    })
                    .cloned(),
            })
            .collect())
    }

    /// 各工序完工状态
    ///
    /// 未同步过的工单按工单定义返回全部 pending
    pub fn get_operation_status(&self, work_order_id: &str) -> ApiResult<Vec<OperationCompletion>> {
        let order = self.load_work_order(work_order_id)?;
        if let Some(snapshot) = order.completion.as_ref().filter(|s| !s.operations.is_empty()) {
            return Ok(snapshot.operations.clone());
        }

        Ok(order
            .operations
            .iter()
            .map(|op| OperationCompletion {
                operation_index: op.operation_index,
                operation_type: op.operation_type.clone(),
                completed_quantity: 0,
                completion_percentage: 0.0,
                status: OperationStatus::Pending,
                assigned_machines: op.assigned_machines(),
            })
            .collect())
    }

    /// 工时与效率分析
    pub fn get_time_analysis(&self, work_order_id: &str) -> ApiResult<TimeAnalysis> {
        let order = self.load_work_order(work_order_id)?;
        Ok(match order.completion {
            Some(CompletionSnapshot {
                time_metrics,
                efficiency_metrics,
                last_synced_at,
                ..
            }) => TimeAnalysis {
                time_metrics,
                efficiency_metrics,
                last_synced_at: Some(last_synced_at),
            },
            None => TimeAnalysis {
                time_metrics: Vec::new(),
                efficiency_metrics: Vec::new(),
                last_synced_at: None,
            },
        })
    }

    /// 实时状态
    pub async fn get_live_status(&self, work_order_id: &str, now: DateTime<Utc>) -> ApiResult<LiveStatus> {
        let order = self.load_work_order(work_order_id)?;
        let sync_interval_secs = self.config.get_sync_interval_secs().await?;

        let last_synced_at = order.completion.as_ref().map(|s| s.last_synced_at);
        let seconds_since_last_sync = last_synced_at.map(|t| (now - t).num_seconds().max(0));
        let stale_after = sync_interval_secs as i64 * STALE_INTERVAL_FACTOR;
        let is_stale = seconds_since_last_sync.map_or(true, |secs| secs > stale_after);

        Ok(LiveStatus {
            work_order_id: order.work_order_id,
            status: order.status,
            last_synced_at,
            seconds_since_last_sync,
            sync_interval_secs,
            is_stale,
        })
    }

    /// 无效扫码审计分页（新→旧）
    ///
    /// # 参数
    /// - page: 页码，从 1 开始
    /// - page_size: 每页条数，1~100
    pub fn list_invalid_scans(
        &self,
        work_order_id: &str,
        page: usize,
        page_size: usize,
    ) -> ApiResult<InvalidScanPage> {
        if page == 0 {
            return Err(ApiError::InvalidInput("页码从 1 开始".to_string()));
        }
        if page_size == 0 || page_size > MAX_INVALID_PAGE_SIZE {
            return Err(ApiError::InvalidInput(format!(
                "每页条数必须在 1~{} 之间: {}",
                MAX_INVALID_PAGE_SIZE, page_size
            )));
        }

        let order = self.load_work_order(work_order_id)?;
        let (total, history) = match order.completion {
            Some(s) => (s.invalid_scans_count, s.invalid_scans),
            None => (0, Vec::new()),
        };

        let retained = history.len();
        let items = history
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();

        Ok(InvalidScanPage {
            total,
            retained,
            page,
            page_size,
            items,
        })
    }
}
