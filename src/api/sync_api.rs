// ==========================================
// 成衣扫码同步系统 - 同步运维 API
// ==========================================
// 职责: 手动触发同步/清理、读写调度配置、查询最近运行记录
// 说明: 手动触发与定时触发共用不重入标记，正在执行时返回 Skipped
// ==========================================

use std::sync::Arc;

use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, SyncConfigReader, SyncSettings};
use crate::domain::types::JobKind;
use crate::engine::{RetentionOutcome, RetentionSweeper, SyncOrchestrator, TickOutcome};
use crate::repository::{SyncRunEntity, SyncRunRepository};

/// 运行记录查询上限
pub const MAX_RECENT_RUNS: usize = 200;

// ==========================================
// SyncApi - 同步运维 API
// ==========================================
pub struct SyncApi {
    orchestrator: Arc<SyncOrchestrator<ConfigManager>>,
    sweeper: Arc<RetentionSweeper<ConfigManager>>,
    config_manager: Arc<ConfigManager>,
    run_repo: Arc<SyncRunRepository>,
}

impl SyncApi {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator<ConfigManager>>,
        sweeper: Arc<RetentionSweeper<ConfigManager>>,
        config_manager: Arc<ConfigManager>,
        run_repo: Arc<SyncRunRepository>,
    ) -> Self {
        Self {
            orchestrator,
            sweeper,
            config_manager,
            run_repo,
        }
    }

    /// 手动触发一轮同步
    pub async fn trigger_sync(&self) -> ApiResult<TickOutcome> {
        info!("收到手动同步请求");
        Ok(self.orchestrator.trigger_manual().await?)
    }

    /// 手动触发一次扫码日志清理
    pub async fn trigger_retention(&self) -> ApiResult<RetentionOutcome> {
        info!("收到手动清理请求");
        Ok(self.sweeper.trigger_manual().await?)
    }

    /// 当前同步是否在执行
    pub fn is_sync_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// 读取当前调度配置
    pub async fn get_settings(&self) -> ApiResult<SyncSettings> {
        Ok(self.config_manager.load_sync_settings().await?)
    }

    /// 修改同步间隔（秒）
    ///
    /// 间隔须在 10~86400 秒，且不超过保留期的 1/4
    pub async fn update_sync_interval(&self, sync_interval_secs: u64) -> ApiResult<SyncSettings> {
        Ok(self.config_manager.update_sync_interval(sync_interval_secs).await?)
    }

    /// 修改扫码日志保留天数
    pub async fn update_retention_days(&self, retention_days: u32) -> ApiResult<SyncSettings> {
        Ok(self.config_manager.update_retention_days(retention_days).await?)
    }

    /// 最近运行记录（新→旧）
    pub fn list_recent_runs(&self, job: JobKind, limit: usize) -> ApiResult<Vec<SyncRunEntity>> {
        if limit == 0 || limit > MAX_RECENT_RUNS {
            return Err(ApiError::InvalidInput(format!(
                "查询条数必须在 1~{} 之间: {}",
                MAX_RECENT_RUNS, limit
            )));
        }
        Ok(self.run_repo.list_recent(job, limit)?)
    }
}
