// ==========================================
// 成衣扫码同步系统 - 同步配置读取 Trait
// ==========================================
// 职责: 定义同步/清理任务所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 同步间隔下限（秒）
pub const MIN_SYNC_INTERVAL_SECS: u64 = 10;
/// 同步间隔上限（秒）
pub const MAX_SYNC_INTERVAL_SECS: u64 = 86_400;
/// 保留期上限（天）
pub const MAX_RETENTION_DAYS: u32 = 3_650;
/// 保留期至少覆盖的同步间隔倍数
pub const RETENTION_INTERVAL_FACTOR: u64 = 4;

// ==========================================
// SyncSettings - 一次执行所用的配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// 同步间隔（秒）
    pub sync_interval_secs: u64,
    /// 扫码日志保留天数
    pub retention_days: u32,
    /// 休息判定阈值（分钟），间隔 >= 阈值不计入工时
    pub break_threshold_minutes: u32,
    /// 效率上限（%）
    pub efficiency_cap_pct: f64,
    /// 无效扫码历史上限
    pub invalid_history_limit: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval_secs: 300,
            retention_days: 30,
            break_threshold_minutes: 30,
            efficiency_cap_pct: 200.0,
            invalid_history_limit: crate::domain::DEFAULT_INVALID_HISTORY_LIMIT,
        }
    }
}

impl SyncSettings {
    /// 校验同步间隔与保留期的组合
    ///
    /// 同步间隔必须明显短于保留期，否则扫码会在被对账前被清理
    pub fn validate(&self) -> RepositoryResult<()> {
        if !(MIN_SYNC_INTERVAL_SECS..=MAX_SYNC_INTERVAL_SECS).contains(&self.sync_interval_secs) {
            return Err(RepositoryError::ValidationError(format!(
                "同步间隔必须在 {}~{} 秒之间: {}",
                MIN_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS, self.sync_interval_secs
            )));
        }
        if self.retention_days == 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(RepositoryError::ValidationError(format!(
                "保留天数必须在 1~{} 之间: {}",
                MAX_RETENTION_DAYS, self.retention_days
            )));
        }
        let retention_secs = self.retention_days as u64 * 86_400;
        if self.sync_interval_secs * RETENTION_INTERVAL_FACTOR > retention_secs {
            return Err(RepositoryError::ValidationError(format!(
                "同步间隔 {} 秒相对保留期 {} 天过长（需不超过保留期的 1/{}）",
                self.sync_interval_secs, self.retention_days, RETENTION_INTERVAL_FACTOR
            )));
        }
        Ok(())
    }
}

// ==========================================
// SyncConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait SyncConfigReader: Send + Sync {
    /// 同步间隔（秒），默认 300
    async fn get_sync_interval_secs(&self) -> RepositoryResult<u64>;

    /// 扫码日志保留天数，默认 30
    async fn get_retention_days(&self) -> RepositoryResult<u32>;

    /// 休息判定阈值（分钟），默认 30
    async fn get_break_threshold_minutes(&self) -> RepositoryResult<u32>;

    /// 效率上限（%），默认 200
    async fn get_efficiency_cap_pct(&self) -> RepositoryResult<f64>;

    /// 无效扫码历史上限，默认 100
    async fn get_invalid_history_limit(&self) -> RepositoryResult<usize>;

    /// 读取完整配置快照
    async fn load_sync_settings(&self) -> RepositoryResult<SyncSettings> {
        Ok(SyncSettings {
            sync_interval_secs: self.get_sync_interval_secs().await?,
            retention_days: self.get_retention_days().await?,
            break_threshold_minutes: self.get_break_threshold_minutes().await?,
            efficiency_cap_pct: self.get_efficiency_cap_pct().await?,
            invalid_history_limit: self.get_invalid_history_limit().await?,
        })
    }
}

/// 固定配置（测试/无数据库场景）
#[async_trait]
impl SyncConfigReader for SyncSettings {
    async fn get_sync_interval_secs(&self) -> RepositoryResult<u64> {
        Ok(self.sync_interval_secs)
    }

    async fn get_retention_days(&self) -> RepositoryResult<u32> {
        Ok(self.retention_days)
    }

    async fn get_break_threshold_minutes(&self) -> RepositoryResult<u32> {
        Ok(self.break_threshold_minutes)
    }

    async fn get_efficiency_cap_pct(&self) -> RepositoryResult<f64> {
        Ok(self.efficiency_cap_pct)
    }

    async fn get_invalid_history_limit(&self) -> RepositoryResult<usize> {
        Ok(self.invalid_history_limit)
    }
}
