// ==========================================
// 成衣扫码同步系统 - 扫码日志仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 扫码日志按 生产日/机台/操作员会话 组织，不按工单存储；
//       工单维度的查询通过条码前缀匹配完成，精确归属由抽取器判定
// ==========================================

use crate::domain::scan::{MachineDay, OperatorSession, ProductionDay, ScanEvent};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{format_date, format_ts, parse_date, parse_opt_ts, parse_ts};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// 保留期清理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanPurgeStats {
    pub days_deleted: usize,
    pub sessions_deleted: usize,
    pub scans_deleted: usize,
}

/// 查询原始行（先取 TEXT，再在仓储边界统一解码）
struct ScanRow {
    production_date: String,
    machine_id: String,
    session_id: String,
    session_operator_id: String,
    session_operator_name: String,
    sign_in_at: String,
    sign_out_at: Option<String>,
    barcode_id: String,
    scanned_at: String,
    scan_machine_id: String,
    scan_operator_id: String,
    scan_operator_name: String,
}

// ==========================================
// ScanLogRepository - 扫码日志仓储
// ==========================================
pub struct ScanLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScanLogRepository {
    /// 创建新的 ScanLogRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 登记操作员会话（已存在时仅补写签退时间）
    pub fn upsert_session(
        &self,
        production_date: NaiveDate,
        machine_id: &str,
        session: &OperatorSession,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO operator_session (
                session_id, production_date, machine_id,
                operator_id, operator_name, sign_in_at, sign_out_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(session_id) DO UPDATE SET
                sign_out_at = COALESCE(excluded.sign_out_at, operator_session.sign_out_at)
            "#,
            params![
                session.session_id,
                format_date(&production_date),
                machine_id,
                session.operator_id,
                session.operator_name,
                format_ts(&session.sign_in_at),
                session.sign_out_at.as_ref().map(format_ts),
            ],
        )?;
        Ok(())
    }

    /// 追加扫码事件（只追加，不修改）
    pub fn append_scan(&self, session_id: &str, scan: &ScanEvent) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO scan_event (
                session_id, barcode_id, scanned_at, machine_id, operator_id, operator_name
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                session_id,
                scan.barcode_id,
                format_ts(&scan.timestamp),
                scan.machine_id,
                scan.operator_id,
                scan.operator_name,
            ],
        )?;
        Ok(())
    }

    /// 写入整段会话及其扫码（导入/测试用）
    pub fn insert_session_with_scans(
        &self,
        production_date: NaiveDate,
        machine_id: &str,
        session: &OperatorSession,
    ) -> RepositoryResult<()> {
        self.upsert_session(production_date, machine_id, session)?;
        for scan in &session.scans {
            self.append_scan(&session.session_id, scan)?;
        }
        Ok(())
    }

    /// 查询条码引用某工单短键的全部扫码
    ///
    /// # 参数
    /// - `work_order_key`: 工单短键（条码最左段，可含连字符）
    ///
    /// # 返回
    /// - 按 生产日 → 机台 → 会话 → 扫码时间 组织的日志
    ///
    /// # 说明
    /// 前缀匹配 `key-` 只是粗过滤：键 `WO1` 也会匹配 `WO1-A` 的条码，
    /// 解码后按完整短键精确比对由抽取器完成
    pub fn find_by_work_order_key(&self, work_order_key: &str) -> RepositoryResult<Vec<ProductionDay>> {
        let conn = self.get_conn()?;
        let prefix = format!("{}-", work_order_key);
        let mut stmt = conn.prepare(
            r#"
            SELECT
                s.production_date, s.machine_id, s.session_id,
                s.operator_id, s.operator_name, s.sign_in_at, s.sign_out_at,
                e.barcode_id, e.scanned_at, e.machine_id, e.operator_id, e.operator_name
            FROM scan_event e
            JOIN operator_session s ON s.session_id = e.session_id
            WHERE substr(e.barcode_id, 1, length(?1)) = ?1
            ORDER BY s.production_date ASC, s.machine_id ASC, s.sign_in_at ASC,
                     s.session_id ASC, e.scanned_at ASC, e.scan_id ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![prefix], |row| {
                Ok(ScanRow {
                    production_date: row.get(0)?,
                    machine_id: row.get(1)?,
                    session_id: row.get(2)?,
                    session_operator_id: row.get(3)?,
                    session_operator_name: row.get(4)?,
                    sign_in_at: row.get(5)?,
                    sign_out_at: row.get(6)?,
                    barcode_id: row.get(7)?,
                    scanned_at: row.get(8)?,
                    scan_machine_id: row.get(9)?,
                    scan_operator_id: row.get(10)?,
                    scan_operator_name: row.get(11)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        group_rows(rows)
    }

    /// 删除早于截止日期的生产日日志
    ///
    /// # 返回
    /// - 删除的生产日数、会话数、扫码数
    pub fn delete_days_before(&self, cutoff: NaiveDate) -> RepositoryResult<ScanPurgeStats> {
        let mut conn = self.get_conn()?;
        let cutoff_str = format_date(&cutoff);
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let days_deleted: i64 = tx.query_row(
            "SELECT COUNT(DISTINCT production_date) FROM operator_session WHERE production_date < ?1",
            params![cutoff_str],
            |row| row.get(0),
        )?;
        let scans_deleted = tx.execute(
            r#"
            DELETE FROM scan_event
            WHERE session_id IN (
                SELECT session_id FROM operator_session WHERE production_date < ?1
            )
            "#,
            params![cutoff_str],
        )?;
        let sessions_deleted = tx.execute(
            "DELETE FROM operator_session WHERE production_date < ?1",
            params![cutoff_str],
        )?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        Ok(ScanPurgeStats {
            days_deleted: days_deleted as usize,
            sessions_deleted,
            scans_deleted,
        })
    }

    /// 扫码总数
    pub fn count_scans(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM scan_event", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// 将有序行折叠为嵌套结构
fn group_rows(rows: Vec<ScanRow>) -> RepositoryResult<Vec<ProductionDay>> {
    let mut days: Vec<ProductionDay> = Vec::new();

    for row in rows {
        let production_date = parse_date("production_date", &row.production_date)?;
        let scan = ScanEvent {
            barcode_id: row.barcode_id,
            timestamp: parse_ts("scanned_at", &row.scanned_at)?,
            machine_id: row.scan_machine_id,
            operator_id: row.scan_operator_id,
            operator_name: row.scan_operator_name,
        };

        if days.last().map(|d| d.production_date) != Some(production_date) {
            days.push(ProductionDay {
                production_date,
                machines: Vec::new(),
            });
        }
        let day_pos = days.len() - 1;
        let day = &mut days[day_pos];

        if day.machines.last().map(|m| m.machine_id.as_str()) != Some(row.machine_id.as_str()) {
            day.machines.push(MachineDay {
                machine_id: row.machine_id.clone(),
                sessions: Vec::new(),
            });
        }
        let machine_pos = day.machines.len() - 1;
        let machine = &mut day.machines[machine_pos];

        if machine.sessions.last().map(|s| s.session_id.as_str()) != Some(row.session_id.as_str()) {
            machine.sessions.push(OperatorSession {
                session_id: row.session_id.clone(),
                operator_id: row.session_operator_id,
                operator_name: row.session_operator_name,
                sign_in_at: parse_ts("sign_in_at", &row.sign_in_at)?,
                sign_out_at: parse_opt_ts("sign_out_at", row.sign_out_at)?,
                scans: Vec::new(),
            });
        }
        let session_pos = machine.sessions.len() - 1;
        let session = &mut machine.sessions[session_pos];
        session.scans.push(scan);
    }

    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn setup_repo() -> ScanLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        ScanLogRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn session(id: &str, barcodes: &[&str]) -> OperatorSession {
        let sign_in = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        OperatorSession {
            session_id: id.to_string(),
            operator_id: "OP1".to_string(),
            operator_name: "张三".to_string(),
            sign_in_at: sign_in,
            sign_out_at: None,
            scans: barcodes
                .iter()
                .enumerate()
                .map(|(i, b)| ScanEvent {
                    barcode_id: b.to_string(),
                    timestamp: sign_in + chrono::Duration::minutes(i as i64 + 1),
                    machine_id: "M01".to_string(),
                    operator_id: "OP1".to_string(),
                    operator_name: "张三".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_find_by_key_groups_and_filters_by_prefix() {
        let repo = setup_repo();
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        repo.insert_session_with_scans(
            day,
            "M01",
            &session("S1", &["WO1-001-01-AAAA", "WO2-001-01-BBBB", "WO1-A-001-01-CCCC"]),
        )
        .unwrap();

        let days = repo.find_by_work_order_key("WO1").unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].machines.len(), 1);
        let scans = &days[0].machines[0].sessions[0].scans;
        // 前缀粗过滤: WO1-A 的条码也会返回
        assert_eq!(scans.len(), 2);
        assert!(scans.iter().all(|s| s.barcode_id.starts_with("WO1-")));
    }

    #[test]
    fn test_prefix_match_treats_wildcards_literally() {
        let repo = setup_repo();
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        repo.insert_session_with_scans(day, "M01", &session("S1", &["WOX1-001-01-AAAA"]))
            .unwrap();
        assert!(repo.find_by_work_order_key("WO_1").unwrap().is_empty());
        assert!(repo.find_by_work_order_key("WO%").unwrap().is_empty());
    }

    #[test]
    fn test_delete_days_before_cutoff() {
        let repo = setup_repo();
        let old_day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let new_day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        repo.insert_session_with_scans(old_day, "M01", &session("S-old", &["WO1-001-01-AAAA"]))
            .unwrap();
        repo.insert_session_with_scans(new_day, "M01", &session("S-new", &["WO1-002-01-AAAA"]))
            .unwrap();

        let stats = repo
            .delete_days_before(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
            .unwrap();
        assert_eq!(stats.days_deleted, 1);
        assert_eq!(stats.sessions_deleted, 1);
        assert_eq!(stats.scans_deleted, 1);
        assert_eq!(repo.count_scans().unwrap(), 1);
    }

    #[test]
    fn test_upsert_session_keeps_sign_out() {
        let repo = setup_repo();
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut s = session("S1", &["WO1-001-01-AAAA"]);
        s.sign_out_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap());
        repo.insert_session_with_scans(day, "M01", &s).unwrap();

        let mut again = s.clone();
        again.sign_out_at = None;
        again.scans.clear();
        repo.upsert_session(day, "M01", &again).unwrap();

        let days = repo.find_by_work_order_key("WO1").unwrap();
        assert_eq!(days[0].machines[0].sessions[0].sign_out_at, s.sign_out_at);
    }
}
