// ==========================================
// 成衣扫码同步系统 - 同步编排器
// ==========================================
// 用途: 每轮同步按工单顺序执行 抽取 → 推断 → 分析 → 写快照
// 约束:
// - 单轮不重入（SingleFlight），重叠触发直接跳过，不排队
// - 单个工单失败只记录，不影响同轮其他工单
// - 扫码日志对本流程只读
// - 每个工单在阻塞线程池上执行，不占用异步工作线程
// - 快照写入以本轮读到的状态为前提，上游改过状态则放弃本次结果
// ==========================================

use crate::config::{SyncConfigReader, SyncSettings};
use crate::domain::types::{JobKind, TickTrigger, WorkOrderStatus};
use crate::domain::work_order::WorkOrder;
use crate::engine::completion::CompletionInferenceEngine;
use crate::engine::efficiency::EfficiencyAnalyzer;
use crate::engine::error::{SyncError, SyncResult};
use crate::engine::extractor::ScanExtractor;
use crate::engine::repositories::SyncRepositories;
use crate::engine::scheduler::{BackgroundJob, SingleFlight};
use crate::engine::snapshot_writer::{Recomputed, SnapshotWriter};
use crate::perf::PerfGuard;
use crate::repository::{RunCompletion, SaveOutcome, SyncStateWrite};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

// ==========================================
// 同步结果
// ==========================================

/// 单个工单的同步摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderSyncSummary {
    pub work_order_id: String,
    pub previous_status: WorkOrderStatus,
    pub status: WorkOrderStatus,
    pub overall_completed_quantity: u32,
    pub valid_scans: usize,
    pub newly_invalid_scans: usize,
    pub excluded_scans: usize,
}

/// 上游在本轮期间改过状态的工单
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleWorkOrder {
    pub work_order_id: String,
    /// 本轮开始时读到的状态
    pub observed_status: WorkOrderStatus,
    /// 写入时库中的状态
    pub current_status: WorkOrderStatus,
}

/// 单个工单的同步结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkOrderSyncOutcome {
    Synced(WorkOrderSyncSummary),
    /// 本次结果已丢弃，下一轮按新状态处理
    StatusChanged(StaleWorkOrder),
}

/// 单个工单的失败记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderFailure {
    pub work_order_id: String,
    pub error: String,
}

/// 一轮同步报告
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub run_id: String,
    pub trigger: TickTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub synced: Vec<WorkOrderSyncSummary>,
    pub stale: Vec<StaleWorkOrder>,
    pub failures: Vec<WorkOrderFailure>,
}

impl TickReport {
    pub fn total(&self) -> usize {
        self.synced.len() + self.stale.len() + self.failures.len()
    }
}

/// 一次触发的结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum TickOutcome {
    Completed(TickReport),
    /// 上一轮仍在执行，本次未做任何事
    Skipped,
}

// ==========================================
// SyncOrchestrator - 同步编排器
// ==========================================

pub struct SyncOrchestrator<C>
where
    C: SyncConfigReader,
{
    config: Arc<C>,
    repos: SyncRepositories,
    syncer: WorkOrderSyncer,
    flight: SingleFlight,
}

impl<C> SyncOrchestrator<C>
where
    C: SyncConfigReader,
{
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - config: 配置读取器（每轮读取一次）
    /// - repos: 仓储集合
    pub fn new(config: Arc<C>, repos: SyncRepositories) -> Self {
        Self {
            config,
            syncer: WorkOrderSyncer::new(repos.clone()),
            repos,
            flight: SingleFlight::new(),
        }
    }

    /// 当前是否有一轮同步在执行
    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    /// 手动触发一轮同步（与定时触发共用不重入标记）
    pub async fn trigger_manual(&self) -> SyncResult<TickOutcome> {
        self.run_tick(TickTrigger::Manual).await
    }

    /// 执行一轮同步
    ///
    /// # 返回
    /// - Ok(Skipped): 已有一轮在执行
    /// - Ok(Completed): 本轮报告（含失败工单）
    /// - Err: 整轮失败（读取配置或工单列表失败）
    pub async fn run_tick(&self, trigger: TickTrigger) -> SyncResult<TickOutcome> {
        let _flight = match self.flight.try_acquire() {
            Some(guard) => guard,
            None => {
                info!(trigger = trigger.as_str(), "上一轮同步仍在执行，跳过本次触发");
                return Ok(TickOutcome::Skipped);
            }
        };

        let started_at = Utc::now();
        let run_id = self
            .repos
            .run_recorder
            .start_run(JobKind::Sync, trigger, started_at)?;
        info!(run_id = %run_id, trigger = trigger.as_str(), "同步开始");

        let prepared = self.prepare_tick().await;
        let (settings, orders) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Err(log_err) = self.repos.run_recorder.fail_run(&run_id, Utc::now(), &e.to_string()) {
                    warn!(run_id = %run_id, error = %log_err, "写入运行日志失败");
                }
                return Err(e);
            }
        };

        let mut synced = Vec::with_capacity(orders.len());
        let mut stale = Vec::new();
        let mut failures = Vec::new();
        let settings = Arc::new(settings);

        for order in &orders {
            match self.sync_on_blocking_pool(order, &settings).await {
                Ok(WorkOrderSyncOutcome::Synced(summary)) => synced.push(summary),
                Ok(WorkOrderSyncOutcome::StatusChanged(changed)) => stale.push(changed),
                Err(e) => {
                    error!(
                        run_id = %run_id,
                        work_order_id = %order.work_order_id,
                        error = %e,
                        "工单同步失败"
                    );
                    failures.push(WorkOrderFailure {
                        work_order_id: order.work_order_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let finished_at = Utc::now();
        let completion = RunCompletion {
            items_total: orders.len() as u32,
            items_succeeded: (synced.len() + stale.len()) as u32,
            items_failed: failures.len() as u32,
            detail: if failures.is_empty() {
                None
            } else {
                Some(
                    failures
                        .iter()
                        .map(|f| format!("{}: {}", f.work_order_id, f.error))
                        .collect::<Vec<_>>()
                        .join("; "),
                )
            },
        };
        if let Err(e) = self.repos.run_recorder.finish_run(&run_id, finished_at, &completion) {
            warn!(run_id = %run_id, error = %e, "写入运行日志失败");
        }

        info!(
            run_id = %run_id,
            total = orders.len(),
            succeeded = synced.len(),
            stale = stale.len(),
            failed = failures.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "同步结束"
        );

        Ok(TickOutcome::Completed(TickReport {
            run_id,
            trigger,
            started_at,
            finished_at,
            synced,
            stale,
            failures,
        }))
    }

    async fn prepare_tick(&self) -> SyncResult<(SyncSettings, Vec<WorkOrder>)> {
        let settings = self.config.load_sync_settings().await?;
        let orders = self
            .repos
            .work_order_store
            .list_by_statuses(&WorkOrderStatus::SYNCABLE)?;
        Ok((settings, orders))
    }

    async fn sync_on_blocking_pool(
        &self,
        order: &WorkOrder,
        settings: &Arc<SyncSettings>,
    ) -> SyncResult<WorkOrderSyncOutcome> {
        let syncer = self.syncer.clone();
        let order = order.clone();
        let settings = Arc::clone(settings);
        tokio::task::spawn_blocking(move || syncer.sync(&order, &settings, Utc::now()))
            .await
            .map_err(|e| SyncError::TaskAborted {
                job: JobKind::Sync.as_str().to_string(),
                message: e.to_string(),
            })?
    }

    /// 同步单个工单（在调用线程上直接执行）
    ///
    /// 重复执行于未变化的日志时，除 last_synced_at 外快照不变
    pub fn sync_work_order(
        &self,
        order: &WorkOrder,
        settings: &SyncSettings,
        now: DateTime<Utc>,
    ) -> SyncResult<WorkOrderSyncOutcome> {
        self.syncer.sync(order, settings, now)
    }
}

// ==========================================
// WorkOrderSyncer - 单工单同步流水线
// ==========================================

/// 抽取 → 推断 → 分析 → 合并 → 写入
///
/// 只持有仓储句柄与无状态引擎，可整体 clone 进阻塞任务
#[derive(Clone)]
struct WorkOrderSyncer {
    repos: SyncRepositories,
    extractor: ScanExtractor,
    completion: CompletionInferenceEngine,
}

impl WorkOrderSyncer {
    fn new(repos: SyncRepositories) -> Self {
        Self {
            repos,
            extractor: ScanExtractor::new(),
            completion: CompletionInferenceEngine::new(),
        }
    }

    fn sync(
        &self,
        order: &WorkOrder,
        settings: &SyncSettings,
        now: DateTime<Utc>,
    ) -> SyncResult<WorkOrderSyncOutcome> {
        let _perf = PerfGuard::new("sync_work_order").with_label(order.work_order_id.clone());

        let days = self
            .repos
            .scan_store
            .find_scans_by_work_order_key(&order.work_order_key)?;
        let extraction = self.extractor.extract(order, &days);

        // 只读筛选；登记与快照同事务提交
        let newly_invalid = self
            .repos
            .work_order_store
            .filter_unregistered_invalid(&order.work_order_id, &extraction.invalid)?;

        let recomputed = extraction.valid.time_span().map(|(first_scan_at, last_scan_at)| Recomputed {
            completion: self.completion.infer(order, &extraction.valid),
            analysis: EfficiencyAnalyzer::from_settings(settings).analyze(order, &extraction.valid),
            first_scan_at,
            last_scan_at,
        });

        let state = SnapshotWriter::new(settings.invalid_history_limit).compose(
            order,
            recomputed,
            &newly_invalid,
            now,
        );

        let outcome = self.repos.work_order_store.save_sync_state(&SyncStateWrite {
            work_order_id: &order.work_order_id,
            expected_status: order.status,
            status: state.status,
            timeline: &state.timeline,
            snapshot: &state.snapshot,
            invalid_scans: &newly_invalid,
        })?;

        if let SaveOutcome::StatusChanged { current } = outcome {
            warn!(
                work_order_id = %order.work_order_id,
                observed = order.status.as_str(),
                current = current.as_str(),
                "工单状态已被上游修改，放弃本次同步结果"
            );
            return Ok(WorkOrderSyncOutcome::StatusChanged(StaleWorkOrder {
                work_order_id: order.work_order_id.clone(),
                observed_status: order.status,
                current_status: current,
            }));
        }

        if state.status != order.status {
            info!(
                work_order_id = %order.work_order_id,
                from = order.status.as_str(),
                to = state.status.as_str(),
                overall_completed = state.snapshot.overall_completed_quantity,
                "工单状态推进"
            );
        }
        if !newly_invalid.is_empty() {
            warn!(
                work_order_id = %order.work_order_id,
                newly_invalid = newly_invalid.len(),
                total_invalid = state.snapshot.invalid_scans_count,
                "发现无效扫码"
            );
        }

        Ok(WorkOrderSyncOutcome::Synced(WorkOrderSyncSummary {
            work_order_id: order.work_order_id.clone(),
            previous_status: order.status,
            status: state.status,
            overall_completed_quantity: state.snapshot.overall_completed_quantity,
            valid_scans: extraction.valid.len(),
            newly_invalid_scans: newly_invalid.len(),
            excluded_scans: extraction.excluded_unassigned,
        }))
    }
}

#[async_trait]
impl<C> BackgroundJob for SyncOrchestrator<C>
where
    C: SyncConfigReader + 'static,
{
    fn job_name(&self) -> &'static str {
        JobKind::Sync.as_str()
    }

    async fn run_scheduled(&self) -> SyncResult<()> {
        self.run_tick(TickTrigger::Scheduled).await.map(|_| ())
    }
}

