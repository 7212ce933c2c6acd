// ==========================================
// 成衣扫码同步系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::sync_config_trait::{SyncConfigReader, SyncSettings};
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 全部 global 配置（用于运维面板展示）
    pub fn list_global_configs(&self) -> RepositoryResult<HashMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 读取并解析数值配置，缺失或格式错误时回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        match self.get_global_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(
                        config_key = key,
                        raw_value = %raw,
                        default = %default,
                        "配置格式错误，使用默认值"
                    );
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 更新同步间隔（与当前保留期联合校验）
    pub async fn update_sync_interval(&self, sync_interval_secs: u64) -> RepositoryResult<SyncSettings> {
        let mut settings = self.load_sync_settings().await?;
        settings.sync_interval_secs = sync_interval_secs;
        settings.validate()?;
        self.set_global_config_value(config_keys::SYNC_INTERVAL_SECS, &sync_interval_secs.to_string())?;
        Ok(settings)
    }

    /// 更新保留天数（与当前同步间隔联合校验）
    pub async fn update_retention_days(&self, retention_days: u32) -> RepositoryResult<SyncSettings> {
        let mut settings = self.load_sync_settings().await?;
        settings.retention_days = retention_days;
        settings.validate()?;
        self.set_global_config_value(config_keys::RETENTION_DAYS, &retention_days.to_string())?;
        Ok(settings)
    }
}

#[async_trait]
impl SyncConfigReader for ConfigManager {
    async fn get_sync_interval_secs(&self) -> RepositoryResult<u64> {
        let default = SyncSettings::default().sync_interval_secs;
        self.get_parsed_or_default(config_keys::SYNC_INTERVAL_SECS, default)
    }

    async fn get_retention_days(&self) -> RepositoryResult<u32> {
        let default = SyncSettings::default().retention_days;
        self.get_parsed_or_default(config_keys::RETENTION_DAYS, default)
    }

    async fn get_break_threshold_minutes(&self) -> RepositoryResult<u32> {
        let default = SyncSettings::default().break_threshold_minutes;
        self.get_parsed_or_default(config_keys::BREAK_THRESHOLD_MINUTES, default)
    }

    async fn get_efficiency_cap_pct(&self) -> RepositoryResult<f64> {
        let default = SyncSettings::default().efficiency_cap_pct;
        self.get_parsed_or_default(config_keys::EFFICIENCY_CAP_PCT, default)
    }

    async fn get_invalid_history_limit(&self) -> RepositoryResult<usize> {
        let default = SyncSettings::default().invalid_history_limit;
        self.get_parsed_or_default(config_keys::INVALID_HISTORY_LIMIT, default)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 调度
    pub const SYNC_INTERVAL_SECS: &str = "sync_interval_secs";
    pub const RETENTION_DAYS: &str = "retention_days";

    // 工时分析
    pub const BREAK_THRESHOLD_MINUTES: &str = "break_threshold_minutes";
    pub const EFFICIENCY_CAP_PCT: &str = "efficiency_cap_pct";

    // 无效扫码审计
    pub const INVALID_HISTORY_LIMIT: &str = "invalid_history_limit";
}
