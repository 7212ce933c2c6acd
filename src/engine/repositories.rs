// ==========================================
// 成衣扫码同步系统 - 引擎层仓储抽象与聚合
// ==========================================
// 职责: 定义同步/清理引擎所需的存储接口，并聚合为一个注入参数
// 说明: 引擎只依赖 trait；SQLite 仓储在此处实现适配，
//       测试可替换为内存实现或阻塞实现
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use crate::domain::scan::ProductionDay;
use crate::domain::snapshot::InvalidScan;
use crate::domain::types::{JobKind, TickTrigger, WorkOrderStatus};
use crate::domain::work_order::WorkOrder;
use crate::repository::{
    RepositoryResult, RunCompletion, SaveOutcome, ScanLogRepository, ScanPurgeStats, SyncRunRepository,
    SyncStateWrite, WorkOrderRepository,
};

// ==========================================
// 存储接口
// ==========================================

/// 扫码日志存储
pub trait ScanStore: Send + Sync {
    /// 条码前缀匹配工单短键的全部扫码日志（按 生产日/机台/会话 组织）
    fn find_scans_by_work_order_key(&self, work_order_key: &str) -> RepositoryResult<Vec<ProductionDay>>;

    /// 删除早于 cutoff 的生产日（含其会话与扫码）
    fn delete_days_before(&self, cutoff: NaiveDate) -> RepositoryResult<ScanPurgeStats>;
}

/// 工单存储
pub trait WorkOrderStore: Send + Sync {
    fn list_by_statuses(&self, statuses: &[WorkOrderStatus]) -> RepositoryResult<Vec<WorkOrder>>;

    /// 只读: 返回尚未登记过的无效扫码
    fn filter_unregistered_invalid(
        &self,
        work_order_id: &str,
        scans: &[InvalidScan],
    ) -> RepositoryResult<Vec<InvalidScan>>;

    /// 原子写入快照并登记无效扫码；状态已被上游改动时不写
    fn save_sync_state(&self, write: &SyncStateWrite<'_>) -> RepositoryResult<SaveOutcome>;

    fn prune_invalid_ledger_before(&self, cutoff: NaiveDate) -> RepositoryResult<usize>;
}

/// 后台任务运行记录
pub trait SyncRunRecorder: Send + Sync {
    fn start_run(&self, job: JobKind, trigger: TickTrigger, started_at: DateTime<Utc>)
        -> RepositoryResult<String>;

    fn finish_run(
        &self,
        run_id: &str,
        completed_at: DateTime<Utc>,
        completion: &RunCompletion,
    ) -> RepositoryResult<()>;

    fn fail_run(&self, run_id: &str, completed_at: DateTime<Utc>, error: &str) -> RepositoryResult<()>;
}

/// 空操作运行记录器
///
/// 用于不需要落库运行日志的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpRunRecorder;

impl SyncRunRecorder for NoOpRunRecorder {
    fn start_run(
        &self,
        job: JobKind,
        trigger: TickTrigger,
        _started_at: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        tracing::debug!(
            "NoOpRunRecorder: 跳过运行记录 - job={}, trigger={}",
            job.as_str(),
            trigger.as_str()
        );
        Ok(String::new())
    }

    fn finish_run(
        &self,
        _run_id: &str,
        _completed_at: DateTime<Utc>,
        _completion: &RunCompletion,
    ) -> RepositoryResult<()> {
        Ok(())
    }

    fn fail_run(&self, _run_id: &str, _completed_at: DateTime<Utc>, _error: &str) -> RepositoryResult<()> {
        Ok(())
    }
}

// ==========================================
// SQLite 仓储适配
// ==========================================

impl ScanStore for ScanLogRepository {
    fn find_scans_by_work_order_key(&self, work_order_key: &str) -> RepositoryResult<Vec<ProductionDay>> {
        self.find_by_work_order_key(work_order_key)
    }

    fn delete_days_before(&self, cutoff: NaiveDate) -> RepositoryResult<ScanPurgeStats> {
        ScanLogRepository::delete_days_before(self, cutoff)
    }
}

impl WorkOrderStore for WorkOrderRepository {
    fn list_by_statuses(&self, statuses: &[WorkOrderStatus]) -> RepositoryResult<Vec<WorkOrder>> {
        self.find_by_statuses(statuses)
    }

    fn filter_unregistered_invalid(
        &self,
        work_order_id: &str,
        scans: &[InvalidScan],
    ) -> RepositoryResult<Vec<InvalidScan>> {
        WorkOrderRepository::filter_unregistered_invalid(self, work_order_id, scans)
    }

    fn save_sync_state(&self, write: &SyncStateWrite<'_>) -> RepositoryResult<SaveOutcome> {
        WorkOrderRepository::save_sync_state(self, write)
    }

    fn prune_invalid_ledger_before(&self, cutoff: NaiveDate) -> RepositoryResult<usize> {
        WorkOrderRepository::prune_invalid_ledger_before(self, cutoff)
    }
}

impl SyncRunRecorder for SyncRunRepository {
    fn start_run(
        &self,
        job: JobKind,
        trigger: TickTrigger,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        SyncRunRepository::start_run(self, job, trigger, started_at)
    }

    fn finish_run(
        &self,
        run_id: &str,
        completed_at: DateTime<Utc>,
        completion: &RunCompletion,
    ) -> RepositoryResult<()> {
        SyncRunRepository::finish_run(self, run_id, completed_at, completion)
    }

    fn fail_run(&self, run_id: &str, completed_at: DateTime<Utc>, error: &str) -> RepositoryResult<()> {
        SyncRunRepository::fail_run(self, run_id, completed_at, error)
    }
}

// ==========================================
// SyncRepositories - 仓储集合
// ==========================================

/// 同步/清理引擎仓储集合
///
/// 同步编排器与保留期清理器共用同一份集合，
/// 测试时可整体替换为 mock
#[derive(Clone)]
pub struct SyncRepositories {
    /// 扫码日志
    pub scan_store: Arc<dyn ScanStore>,
    /// 工单
    pub work_order_store: Arc<dyn WorkOrderStore>,
    /// 运行记录
    pub run_recorder: Arc<dyn SyncRunRecorder>,
}

impl SyncRepositories {
    pub fn new(
        scan_store: Arc<dyn ScanStore>,
        work_order_store: Arc<dyn WorkOrderStore>,
        run_recorder: Arc<dyn SyncRunRecorder>,
    ) -> Self {
        Self {
            scan_store,
            work_order_store,
            run_recorder,
        }
    }

    /// 基于共享 SQLite 连接构建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            scan_store: Arc::new(ScanLogRepository::from_connection(conn.clone())),
            work_order_store: Arc::new(WorkOrderRepository::from_connection(conn.clone())),
            run_recorder: Arc::new(SyncRunRepository::from_connection(conn)),
        }
    }

    /// 不记录运行日志的版本
    pub fn without_run_log(self) -> Self {
        Self {
            run_recorder: Arc::new(NoOpRunRecorder),
            ..self
        }
    }
}
