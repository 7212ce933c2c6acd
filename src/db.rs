// ==========================================
// 成衣扫码同步系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键/busy_timeout）
// - 统一建表脚本，扫码日志库与工单库共用同一数据库文件
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    crate::perf::install_sqlite_tracing(&mut conn);
    Ok(conn)
}

/// 打开连接、建表并包装为共享连接
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 建表（幂等）
///
/// 表分组:
/// - 扫码日志: operator_session / scan_event（引擎只读，保留期任务删除）
/// - 工单: work_order / work_order_operation（快照以 JSON 存于工单行）
/// - 对账: invalid_scan_ledger（无效扫码指纹，保证累计计数幂等）
/// - 运维: sync_run_log / config_kv
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS operator_session (
            session_id TEXT PRIMARY KEY,
            production_date TEXT NOT NULL,
            machine_id TEXT NOT NULL,
            operator_id TEXT NOT NULL,
            operator_name TEXT NOT NULL,
            sign_in_at TEXT NOT NULL,
            sign_out_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_operator_session_day
          ON operator_session(production_date, machine_id);

        CREATE TABLE IF NOT EXISTS scan_event (
            scan_id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES operator_session(session_id) ON DELETE CASCADE,
            barcode_id TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            machine_id TEXT NOT NULL,
            operator_id TEXT NOT NULL,
            operator_name TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scan_event_barcode
          ON scan_event(barcode_id);

        CREATE INDEX IF NOT EXISTS idx_scan_event_session
          ON scan_event(session_id, scanned_at);

        CREATE TABLE IF NOT EXISTS work_order (
            work_order_id TEXT PRIMARY KEY,
            work_order_key TEXT NOT NULL UNIQUE,
            work_order_number TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            status TEXT NOT NULL,
            created_at TEXT,
            production_started_at TEXT,
            completed_at TEXT,
            completion_snapshot_json TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_work_order_status
          ON work_order(status);

        CREATE TABLE IF NOT EXISTS work_order_operation (
            work_order_id TEXT NOT NULL REFERENCES work_order(work_order_id) ON DELETE CASCADE,
            operation_index INTEGER NOT NULL,
            operation_type TEXT NOT NULL,
            primary_machine_id TEXT NOT NULL,
            secondary_machine_ids TEXT NOT NULL DEFAULT '[]',
            planned_time_secs REAL,
            estimated_time_secs REAL,
            PRIMARY KEY (work_order_id, operation_index)
        );

        CREATE TABLE IF NOT EXISTS invalid_scan_ledger (
            work_order_id TEXT NOT NULL REFERENCES work_order(work_order_id) ON DELETE CASCADE,
            barcode_id TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            production_date TEXT NOT NULL,
            reason TEXT NOT NULL,
            registered_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (work_order_id, barcode_id, scanned_at)
        );

        CREATE INDEX IF NOT EXISTS idx_invalid_scan_ledger_day
          ON invalid_scan_ledger(production_date);

        CREATE TABLE IF NOT EXISTS sync_run_log (
            run_id TEXT PRIMARY KEY,
            job_kind TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL,
            items_total INTEGER NOT NULL DEFAULT 0,
            items_succeeded INTEGER NOT NULL DEFAULT 0,
            items_failed INTEGER NOT NULL DEFAULT 0,
            detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_run_log_job
          ON sync_run_log(job_kind, started_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_absent_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
