// ==========================================
// 成衣扫码同步系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态、后台任务与 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::task::JoinHandle;

use crate::api::{DashboardApi, SyncApi};
use crate::config::{ConfigManager, SyncConfigReader, SyncSettings};
use crate::db::open_shared_connection;
use crate::engine::{
    spawn_periodic, ConfiguredIntervalTicker, IntervalTicker, RetentionSweeper, SyncOrchestrator,
    SyncRepositories, RETENTION_SWEEP_PERIOD,
};
use crate::repository::{ScanLogRepository, SyncRunRepository, WorkOrderRepository};

/// 应用状态
///
/// 包含所有 API 实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 同步编排器
    pub orchestrator: Arc<SyncOrchestrator<ConfigManager>>,

    /// 保留期清理器
    pub sweeper: Arc<RetentionSweeper<ConfigManager>>,

    /// 看板API
    pub dashboard_api: Arc<DashboardApi>,

    /// 同步运维API
    pub sync_api: Arc<SyncApi>,

    /// 扫码日志仓储（导入工具使用）
    pub scan_repo: Arc<ScanLogRepository>,

    /// 工单仓储
    pub work_order_repo: Arc<WorkOrderRepository>,
}

/// 后台任务句柄
pub struct BackgroundTasks {
    pub sync_loop: JoinHandle<()>,
    pub retention_loop: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn abort(&self) {
        self.sync_loop.abort();
        self.retention_loop.abort();
    }
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（":memory:" 用于测试）
    pub fn new(db_path: String) -> anyhow::Result<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_shared_connection(&db_path)?;
        let state = Self::from_connection(db_path, conn);

        tracing::info!("AppState初始化完成");
        Ok(state)
    }

    /// 基于已初始化 schema 的共享连接构建
    pub fn from_connection(db_path: String, conn: Arc<Mutex<Connection>>) -> Self {
        // ==========================================
        // 初始化Repository层
        // ==========================================
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));
        let scan_repo = Arc::new(ScanLogRepository::from_connection(conn.clone()));
        let work_order_repo = Arc::new(WorkOrderRepository::from_connection(conn.clone()));
        let run_repo = Arc::new(SyncRunRepository::from_connection(conn.clone()));

        let repos = SyncRepositories::new(scan_repo.clone(), work_order_repo.clone(), run_repo.clone());

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let orchestrator = Arc::new(SyncOrchestrator::new(config_manager.clone(), repos.clone()));
        let sweeper = Arc::new(RetentionSweeper::new(config_manager.clone(), repos));

        // ==========================================
        // 初始化API层
        // ==========================================
        let dashboard_api = Arc::new(DashboardApi::new(
            work_order_repo.clone(),
            config_manager.clone() as Arc<dyn SyncConfigReader>,
        ));
        let sync_api = Arc::new(SyncApi::new(
            orchestrator.clone(),
            sweeper.clone(),
            config_manager.clone(),
            run_repo,
        ));

        Self {
            db_path,
            conn,
            config_manager,
            orchestrator,
            sweeper,
            dashboard_api,
            sync_api,
            scan_repo,
            work_order_repo,
        }
    }

    /// 启动同步与清理两个后台循环
    ///
    /// 需在 tokio 运行时内调用
    pub fn spawn_background_tasks(&self) -> BackgroundTasks {
        let fallback_secs = SyncSettings::default().sync_interval_secs;
        let sync_loop = spawn_periodic(
            self.orchestrator.clone(),
            ConfiguredIntervalTicker::new(self.config_manager.clone(), fallback_secs),
        );
        let retention_loop = spawn_periodic(
            self.sweeper.clone(),
            IntervalTicker::new(RETENTION_SWEEP_PERIOD),
        );

        BackgroundTasks {
            sync_loop,
            retention_loop,
        }
    }
}

/// 默认数据库路径
///
/// 优先使用环境变量 GARMENT_SCAN_SYNC_DB_PATH，其次用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("GARMENT_SCAN_SYNC_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./garment_scan_sync.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("garment-scan-sync");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("garment_scan_sync.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[tokio::test]
    async fn test_app_state_in_memory() {
        let state = AppState::new(":memory:".to_string()).unwrap();
        let settings = state.sync_api.get_settings().await.unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert!(!state.sync_api.is_sync_running());
    }
}
