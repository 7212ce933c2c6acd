// ==========================================
// 成衣扫码同步系统 - 工单仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 工单与工序由上游写入；本系统只写 状态/时间线/完工快照/无效扫码指纹
// ==========================================

use crate::domain::snapshot::{CompletionSnapshot, InvalidScan};
use crate::domain::types::WorkOrderStatus;
use crate::domain::work_order::{Operation, WorkOrder, WorkOrderTimeline};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{format_date, format_ts, parse_opt_ts};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// 工单行原始值
struct WorkOrderRow {
    work_order_id: String,
    work_order_key: String,
    work_order_number: String,
    quantity: i64,
    status: String,
    created_at: Option<String>,
    production_started_at: Option<String>,
    completed_at: Option<String>,
    completion_snapshot_json: Option<String>,
}

const WORK_ORDER_COLUMNS: &str = r#"
    work_order_id, work_order_key, work_order_number, quantity, status,
    created_at, production_started_at, completed_at, completion_snapshot_json
"#;

fn map_work_order_row(row: &rusqlite::Row<'_>) -> SqliteResult<WorkOrderRow> {
    Ok(WorkOrderRow {
        work_order_id: row.get(0)?,
        work_order_key: row.get(1)?,
        work_order_number: row.get(2)?,
        quantity: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        production_started_at: row.get(6)?,
        completed_at: row.get(7)?,
        completion_snapshot_json: row.get(8)?,
    })
}

/// 一次同步的待写入内容
#[derive(Debug, Clone, Copy)]
pub struct SyncStateWrite<'a> {
    pub work_order_id: &'a str,
    /// 本轮开始时读到的状态，写入以它为前提
    pub expected_status: WorkOrderStatus,
    pub status: WorkOrderStatus,
    pub timeline: &'a WorkOrderTimeline,
    pub snapshot: &'a CompletionSnapshot,
    /// 本次首次出现的无效扫码，随快照一起登记
    pub invalid_scans: &'a [InvalidScan],
}

/// 同步写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// 上游已改动状态，本次未写入
    StatusChanged { current: WorkOrderStatus },
}

// ==========================================
// WorkOrderRepository - 工单仓储
// ==========================================
pub struct WorkOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkOrderRepository {
    /// 创建新的 WorkOrderRepository 实例
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

    /// 创建工单及其工序（上游建单/测试数据用）
    pub fn create(&self, work_order: &WorkOrder) -> RepositoryResult<()> {
        if work_order.quantity == 0 {
            return Err(RepositoryError::ValidationError(format!(
                "工单数量必须大于0: {}",
                work_order.work_order_id
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let snapshot_json = match &work_order.completion {
            Some(snapshot) => Some(serde_json::to_string(snapshot)?),
            None => None,
        };

        tx.execute(
            r#"
            INSERT INTO work_order (
                work_order_id, work_order_key, work_order_number, quantity, status,
                created_at, production_started_at, completed_at, completion_snapshot_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                work_order.work_order_id,
                work_order.work_order_key,
                work_order.work_order_number,
                work_order.quantity as i64,
                work_order.status.as_str(),
                work_order.timeline.created_at.as_ref().map(format_ts),
                work_order.timeline.production_started_at.as_ref().map(format_ts),
                work_order.timeline.completed_at.as_ref().map(format_ts),
                snapshot_json,
            ],
        )?;

        for op in &work_order.operations {
            tx.execute(
                r#"
                INSERT INTO work_order_operation (
                    work_order_id, operation_index, operation_type, primary_machine_id,
                    secondary_machine_ids, planned_time_secs, estimated_time_secs
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    work_order.work_order_id,
                    op.operation_index as i64,
                    op.operation_type,
                    op.primary_machine_id,
                    serde_json::to_string(&op.secondary_machine_ids)?,
                    op.planned_time_secs,
                    op.estimated_time_secs,
                ],
            )?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    /// 按ID查询工单（含工序与快照）
    pub fn find_by_id(&self, work_order_id: &str) -> RepositoryResult<Option<WorkOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM work_order WHERE work_order_id = ?1",
            WORK_ORDER_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![work_order_id], map_work_order_row)
            .optional()?;

        match row {
            Some(row) => {
                let operations = load_operations(&conn, &row.work_order_id)?;
                Ok(Some(assemble(row, operations)?))
            }
            None => Ok(None),
        }
    }

    /// 按状态集合查询工单
    pub fn find_by_statuses(&self, statuses: &[WorkOrderStatus]) -> RepositoryResult<Vec<WorkOrder>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM work_order WHERE status IN ({}) ORDER BY work_order_id ASC",
            WORK_ORDER_COLUMNS, placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params_from_iter(statuses.iter().map(|s| s.as_str())),
                map_work_order_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let operations = load_operations(&conn, &row.work_order_id)?;
            orders.push(assemble(row, operations)?);
        }
        Ok(orders)
    }

    /// 写入同步结果（状态 + 时间线 + 快照 + 无效扫码指纹）
    ///
    /// # 说明
    /// - 快照 UPDATE 与指纹登记在同一事务内，任一步失败整体回滚，
    ///   下一轮仍能把这些无效扫码识别为首次出现
    /// - UPDATE 以 status = expected_status 为条件；上游在本轮期间改过状态时
    ///   不写入任何内容，返回 StatusChanged
    pub fn save_sync_state(&self, write: &SyncStateWrite<'_>) -> RepositoryResult<SaveOutcome> {
        let snapshot_json = serde_json::to_string(write.snapshot)?;

        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let updated = tx.execute(
            r#"
            UPDATE work_order SET
                status = ?2,
                production_started_at = ?3,
                completed_at = ?4,
                completion_snapshot_json = ?5,
                updated_at = datetime('now')
            WHERE work_order_id = ?1 AND status = ?6
            "#,
            params![
                write.work_order_id,
                write.status.as_str(),
                write.timeline.production_started_at.as_ref().map(format_ts),
                write.timeline.completed_at.as_ref().map(format_ts),
                snapshot_json,
                write.expected_status.as_str(),
            ],
        )?;

        if updated == 0 {
            // 事务未提交，随 tx 丢弃回滚
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM work_order WHERE work_order_id = ?1",
                    params![write.work_order_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match current {
                Some(raw) => Ok(SaveOutcome::StatusChanged {
                    current: parse_status(&raw)?,
                }),
                None => Err(RepositoryError::NotFound {
                    entity: "WorkOrder".to_string(),
                    id: write.work_order_id.to_string(),
                }),
            };
        }

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO invalid_scan_ledger (
                    work_order_id, barcode_id, scanned_at, production_date, reason
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for scan in write.invalid_scans {
                stmt.execute(params![
                    write.work_order_id,
                    scan.barcode_id,
                    format_ts(&scan.timestamp),
                    format_date(&scan.production_date),
                    scan.reason.as_str(),
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(SaveOutcome::Saved)
    }

    /// 上游状态变更（暂停/取消等）
    pub fn update_status(&self, work_order_id: &str, status: WorkOrderStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE work_order SET status = ?2, updated_at = datetime('now') WHERE work_order_id = ?1",
            params![work_order_id, status.as_str()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "WorkOrder".to_string(),
                id: work_order_id.to_string(),
            });
        }
        Ok(())
    }

    /// 筛出尚未登记的无效扫码（只读）
    ///
    /// # 说明
    /// 指纹 = (工单, 条码, 扫码时间)，保证同一份日志重复同步不会重复累计；
    /// 登记本身随 save_sync_state 一起提交
    pub fn filter_unregistered_invalid(
        &self,
        work_order_id: &str,
        scans: &[InvalidScan],
    ) -> RepositoryResult<Vec<InvalidScan>> {
        if scans.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM invalid_scan_ledger
                WHERE work_order_id = ?1 AND barcode_id = ?2 AND scanned_at = ?3
            )
            "#,
        )?;

        let mut fresh = Vec::new();
        for scan in scans {
            let registered: bool = stmt.query_row(
                params![work_order_id, scan.barcode_id, format_ts(&scan.timestamp)],
                |row| row.get(0),
            )?;
            if !registered {
                fresh.push(scan.clone());
            }
        }
        Ok(fresh)
    }

    /// 清理已过保留期的无效扫码指纹（原始扫码已删除，不会再被读到）
    pub fn prune_invalid_ledger_before(&self, cutoff: NaiveDate) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM invalid_scan_ledger WHERE production_date < ?1",
            params![format_date(&cutoff)],
        )?;
        Ok(deleted)
    }
}

fn load_operations(conn: &Connection, work_order_id: &str) -> RepositoryResult<Vec<Operation>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT operation_index, operation_type, primary_machine_id,
               secondary_machine_ids, planned_time_secs, estimated_time_secs
        FROM work_order_operation
        WHERE work_order_id = ?1
        ORDER BY operation_index ASC
        "#,
    )?;

    let raw = stmt
        .query_map(params![work_order_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
            ))
        })?
        .collect::<SqliteResult<Vec<_>>>()?;

    raw.into_iter()
        .map(|(index, operation_type, primary, secondary_json, planned, estimated)| {
            let secondary_machine_ids: Vec<String> = serde_json::from_str(&secondary_json)
                .map_err(|e| RepositoryError::FieldValueError {
                    field: "secondary_machine_ids".to_string(),
                    message: e.to_string(),
                })?;
            Ok(Operation {
                operation_index: index as u32,
                operation_type,
                primary_machine_id: primary,
                secondary_machine_ids,
                planned_time_secs: planned,
                estimated_time_secs: estimated,
            })
        })
        .collect()
}

fn parse_status(raw: &str) -> RepositoryResult<WorkOrderStatus> {
    WorkOrderStatus::parse(raw).ok_or_else(|| RepositoryError::FieldValueError {
        field: "status".to_string(),
        message: format!("未知工单状态: {}", raw),
    })
}

fn assemble(row: WorkOrderRow, operations: Vec<Operation>) -> RepositoryResult<WorkOrder> {
    let status = parse_status(&row.status)?;

    let completion = match row.completion_snapshot_json {
        Some(json) if !json.trim().is_empty() => Some(serde_json::from_str::<CompletionSnapshot>(&json)?),
        _ => None,
    };

    Ok(WorkOrder {
        work_order_id: row.work_order_id,
        work_order_key: row.work_order_key,
        work_order_number: row.work_order_number,
        quantity: row.quantity.max(0) as u32,
        operations,
        status,
        timeline: WorkOrderTimeline {
            created_at: parse_opt_ts("created_at", row.created_at)?,
            production_started_at: parse_opt_ts("production_started_at", row.production_started_at)?,
            completed_at: parse_opt_ts("completed_at", row.completed_at)?,
        },
        completion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::InvalidScanReason;
    use chrono::{TimeZone, Utc};

    fn setup_repo() -> WorkOrderRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        WorkOrderRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn order(id: &str, status: WorkOrderStatus) -> WorkOrder {
        WorkOrder {
            work_order_id: id.to_string(),
            work_order_key: format!("K{}", id),
            work_order_number: format!("WO-2026-{}", id),
            quantity: 3,
            operations: vec![Operation {
                operation_index: 1,
                operation_type: "锁边".to_string(),
                primary_machine_id: "M01".to_string(),
                secondary_machine_ids: vec!["M02".to_string()],
                planned_time_secs: Some(60.0),
                estimated_time_secs: None,
            }],
            status,
            timeline: WorkOrderTimeline::default(),
            completion: None,
        }
    }

    fn invalid(barcode: &str, minute: u32) -> InvalidScan {
        InvalidScan {
            barcode_id: barcode.to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap(),
            production_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            machine_id: "M01".to_string(),
            operator_id: "OP1".to_string(),
            operator_name: "张三".to_string(),
            reason: InvalidScanReason::InvalidFormat,
            detail: "bad".to_string(),
        }
    }

    #[test]
    fn test_create_and_find_roundtrip() {
        let repo = setup_repo();
        let wo = order("1", WorkOrderStatus::Ready);
        repo.create(&wo).unwrap();
        let loaded = repo.find_by_id("1").unwrap().unwrap();
        assert_eq!(loaded, wo);
        assert!(repo.find_by_id("404").unwrap().is_none());
    }

    #[test]
    fn test_find_by_statuses_filters() {
        let repo = setup_repo();
        repo.create(&order("1", WorkOrderStatus::Ready)).unwrap();
        repo.create(&order("2", WorkOrderStatus::Completed)).unwrap();
        repo.create(&order("3", WorkOrderStatus::Paused)).unwrap();

        let active = repo.find_by_statuses(&WorkOrderStatus::SYNCABLE).unwrap();
        let ids: Vec<_> = active.iter().map(|w| w.work_order_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    fn write<'a>(
        id: &'a str,
        expected_status: WorkOrderStatus,
        timeline: &'a WorkOrderTimeline,
        snapshot: &'a CompletionSnapshot,
        invalid_scans: &'a [InvalidScan],
    ) -> SyncStateWrite<'a> {
        SyncStateWrite {
            work_order_id: id,
            expected_status,
            status: WorkOrderStatus::InProgress,
            timeline,
            snapshot,
            invalid_scans,
        }
    }

    #[test]
    fn test_ledger_registered_with_snapshot() {
        let repo = setup_repo();
        repo.create(&order("1", WorkOrderStatus::Ready)).unwrap();
        let timeline = WorkOrderTimeline::default();
        let snapshot = CompletionSnapshot::empty(Utc::now());

        let batch = vec![invalid("X-1", 1), invalid("X-2", 2)];
        assert_eq!(repo.filter_unregistered_invalid("1", &batch).unwrap().len(), 2);
        // 只筛不登记
        assert_eq!(repo.filter_unregistered_invalid("1", &batch).unwrap().len(), 2);

        let outcome = repo
            .save_sync_state(&write("1", WorkOrderStatus::Ready, &timeline, &snapshot, &batch))
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);
        assert!(repo.filter_unregistered_invalid("1", &batch).unwrap().is_empty());

        let more = vec![invalid("X-2", 2), invalid("X-3", 3)];
        let fresh = repo.filter_unregistered_invalid("1", &more).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].barcode_id, "X-3");
    }

    #[test]
    fn test_save_rejected_when_status_changed_upstream() {
        let repo = setup_repo();
        repo.create(&order("1", WorkOrderStatus::Ready)).unwrap();
        repo.update_status("1", WorkOrderStatus::Cancelled).unwrap();

        let timeline = WorkOrderTimeline::default();
        let snapshot = CompletionSnapshot::empty(Utc::now());
        let batch = vec![invalid("X-1", 1)];
        let outcome = repo
            .save_sync_state(&write("1", WorkOrderStatus::Ready, &timeline, &snapshot, &batch))
            .unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::StatusChanged {
                current: WorkOrderStatus::Cancelled
            }
        );

        // 状态、快照、指纹都未写入
        let loaded = repo.find_by_id("1").unwrap().unwrap();
        assert_eq!(loaded.status, WorkOrderStatus::Cancelled);
        assert!(loaded.completion.is_none());
        assert_eq!(repo.filter_unregistered_invalid("1", &batch).unwrap().len(), 1);
    }

    #[test]
    fn test_save_sync_state_missing_order() {
        let repo = setup_repo();
        let timeline = WorkOrderTimeline::default();
        let snapshot = CompletionSnapshot::empty(Utc::now());
        let err = repo
            .save_sync_state(&write("404", WorkOrderStatus::Ready, &timeline, &snapshot, &[]))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
