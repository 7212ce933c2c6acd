// ==========================================
// 成衣扫码同步系统 - 扫码日志保留期清理
// ==========================================
// 职责: 每日删除早于 (今天 - 保留天数) 的生产日日志
// 说明: 不区分是否已对账；完工快照只增不减，清理不影响已同步结果
//       同时清理对应生产日的无效扫码指纹（原始扫码已不可再读）
// ==========================================

use crate::config::SyncConfigReader;
use crate::domain::types::{JobKind, TickTrigger};
use crate::engine::error::{SyncError, SyncResult};
use crate::engine::repositories::SyncRepositories;
use crate::engine::scheduler::{BackgroundJob, SingleFlight};
use crate::repository::{RunCompletion, ScanPurgeStats};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// 清理周期
pub const RETENTION_SWEEP_PERIOD: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// 一次清理的报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    pub run_id: String,
    pub trigger: TickTrigger,
    pub retention_days: u32,
    /// 早于此日期的生产日被删除
    pub cutoff: NaiveDate,
    pub days_deleted: usize,
    pub sessions_deleted: usize,
    pub scans_deleted: usize,
    pub ledger_entries_pruned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum RetentionOutcome {
    Completed(RetentionReport),
    Skipped,
}

// ==========================================
// RetentionSweeper
// ==========================================
pub struct RetentionSweeper<C>
where
    C: SyncConfigReader,
{
    config: Arc<C>,
    repos: SyncRepositories,
    flight: SingleFlight,
}

impl<C> RetentionSweeper<C>
where
    C: SyncConfigReader,
{
    pub fn new(config: Arc<C>, repos: SyncRepositories) -> Self {
        Self {
            config,
            repos,
            flight: SingleFlight::new(),
        }
    }

    pub async fn trigger_manual(&self) -> SyncResult<RetentionOutcome> {
        self.sweep(TickTrigger::Manual, Utc::now().date_naive()).await
    }

    /// 以 today 为基准执行一次清理
    pub async fn sweep(&self, trigger: TickTrigger, today: NaiveDate) -> SyncResult<RetentionOutcome> {
        let _flight = match self.flight.try_acquire() {
            Some(guard) => guard,
            None => {
                info!(trigger = trigger.as_str(), "上一轮清理仍在执行，跳过本次触发");
                return Ok(RetentionOutcome::Skipped);
            }
        };

        let run_id = self
            .repos
            .run_recorder
            .start_run(JobKind::Retention, trigger, Utc::now())?;

        match self.purge(today).await {
            Ok((retention_days, cutoff, stats, ledger_entries_pruned)) => {
                let completion = RunCompletion {
                    items_total: stats.days_deleted as u32,
                    items_succeeded: stats.days_deleted as u32,
                    items_failed: 0,
                    detail: Some(format!(
                        "cutoff={}, sessions={}, scans={}, ledger={}",
                        cutoff, stats.sessions_deleted, stats.scans_deleted, ledger_entries_pruned
                    )),
                };
                if let Err(e) = self.repos.run_recorder.finish_run(&run_id, Utc::now(), &completion) {
                    warn!(run_id = %run_id, error = %e, "写入运行日志失败");
                }

                info!(
                    run_id = %run_id,
                    %cutoff,
                    days_deleted = stats.days_deleted,
                    scans_deleted = stats.scans_deleted,
                    ledger_entries_pruned,
                    "扫码日志清理完成"
                );

                Ok(RetentionOutcome::Completed(RetentionReport {
                    run_id,
                    trigger,
                    retention_days,
                    cutoff,
                    days_deleted: stats.days_deleted,
                    sessions_deleted: stats.sessions_deleted,
                    scans_deleted: stats.scans_deleted,
                    ledger_entries_pruned,
                }))
            }
            Err(e) => {
                if let Err(log_err) = self.repos.run_recorder.fail_run(&run_id, Utc::now(), &e.to_string()) {
                    warn!(run_id = %run_id, error = %log_err, "写入运行日志失败");
                }
                Err(e)
            }
        }
    }

    async fn purge(&self, today: NaiveDate) -> SyncResult<(u32, NaiveDate, ScanPurgeStats, usize)> {
        let retention_days = self.config.get_retention_days().await?;
        if retention_days == 0 {
            return Err(SyncError::InvalidConfig("保留天数不能为 0".to_string()));
        }
        let cutoff = today - Duration::days(retention_days as i64);

        let stats = self.repos.scan_store.delete_days_before(cutoff)?;
        let pruned = self.repos.work_order_store.prune_invalid_ledger_before(cutoff)?;
        Ok((retention_days, cutoff, stats, pruned))
    }
}

#[async_trait]
impl<C> BackgroundJob for RetentionSweeper<C>
where
    C: SyncConfigReader + 'static,
{
    fn job_name(&self) -> &'static str {
        JobKind::Retention.as_str()
    }

    async fn run_scheduled(&self) -> SyncResult<()> {
        self.sweep(TickTrigger::Scheduled, Utc::now().date_naive())
            .await
            .map(|_| ())
    }
}
