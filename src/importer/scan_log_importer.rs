// ==========================================
// 成衣扫码同步系统 - 扫码日志 / 工单导入
// ==========================================
// 扫码日志 CSV 列:
//   production_date, machine_id, session_id, operator_id, operator_name,
//   sign_in_at, sign_out_at, barcode_id, scanned_at
// - barcode_id 为空的行只登记会话（签到/签退）
// - 时间为 RFC3339，日期为 YYYY-MM-DD
// 工单: JSON 数组，结构同领域模型 WorkOrder
// ==========================================

use crate::domain::scan::{OperatorSession, ScanEvent};
use crate::domain::work_order::WorkOrder;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::{ScanLogRepository, WorkOrderRepository};
use chrono::{DateTime, NaiveDate, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// CSV 原始行
#[derive(Debug, Clone, Deserialize)]
struct ScanLogRow {
    production_date: String,
    machine_id: String,
    session_id: String,
    operator_id: String,
    operator_name: String,
    sign_in_at: String,
    #[serde(default)]
    sign_out_at: Option<String>,
    #[serde(default)]
    barcode_id: Option<String>,
    #[serde(default)]
    scanned_at: Option<String>,
}

/// 导入统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanImportReport {
    pub rows_read: usize,
    pub sessions_upserted: usize,
    pub scans_appended: usize,
    /// (行号, 原因)
    pub rows_rejected: Vec<(usize, String)>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_rfc3339(row: usize, field: &str, raw: &str) -> ImportResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ImportError::DateFormatError {
            row,
            field: field.to_string(),
            value: raw.to_string(),
        })
}

fn require(row: usize, field: &str, value: &str) -> ImportResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ImportError::MissingField {
            row,
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// 单行 → (生产日, 机台, 会话, 可选扫码)
fn map_row(row_no: usize, row: ScanLogRow) -> ImportResult<(NaiveDate, String, OperatorSession, Option<ScanEvent>)> {
    let production_date = NaiveDate::parse_from_str(row.production_date.trim(), "%Y-%m-%d").map_err(|_| {
        ImportError::DateFormatError {
            row: row_no,
            field: "production_date".to_string(),
            value: row.production_date.clone(),
        }
    })?;
    let machine_id = require(row_no, "machine_id", &row.machine_id)?;
    let operator_id = require(row_no, "operator_id", &row.operator_id)?;
    let operator_name = row.operator_name.trim().to_string();

    let session = OperatorSession {
        session_id: require(row_no, "session_id", &row.session_id)?,
        operator_id: operator_id.clone(),
        operator_name: operator_name.clone(),
        sign_in_at: parse_rfc3339(row_no, "sign_in_at", &row.sign_in_at)?,
        sign_out_at: match non_empty(row.sign_out_at) {
            Some(raw) => Some(parse_rfc3339(row_no, "sign_out_at", &raw)?),
            None => None,
        },
        scans: Vec::new(),
    };

    let scan = match non_empty(row.barcode_id) {
        Some(barcode_id) => {
            let scanned_at = non_empty(row.scanned_at).ok_or_else(|| ImportError::MissingField {
                row: row_no,
                field: "scanned_at".to_string(),
            })?;
            Some(ScanEvent {
                barcode_id,
                timestamp: parse_rfc3339(row_no, "scanned_at", &scanned_at)?,
                machine_id: machine_id.clone(),
                operator_id,
                operator_name,
            })
        }
        None => None,
    };

    Ok((production_date, machine_id, session, scan))
}

// ==========================================
// ScanLogImporter
// ==========================================
pub struct ScanLogImporter<'a> {
    scan_repo: &'a ScanLogRepository,
}

impl<'a> ScanLogImporter<'a> {
    pub fn new(scan_repo: &'a ScanLogRepository) -> Self {
        Self { scan_repo }
    }

    /// 从 CSV 文件导入
    pub fn import_file(&self, path: &Path) -> ImportResult<ScanImportReport> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => {}
            other => return Err(ImportError::UnsupportedFormat(other.unwrap_or("").to_string())),
        }
        let file = std::fs::File::open(path)?;
        self.import_reader(file)
    }

    /// 从任意 CSV 输入导入
    ///
    /// 坏行记录到 rows_rejected 后跳过，不中断整批
    pub fn import_reader<R: Read>(&self, reader: R) -> ImportResult<ScanImportReport> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut report = ScanImportReport::default();
        for (idx, record) in csv_reader.deserialize::<ScanLogRow>().enumerate() {
            // 表头占第 1 行
            let row_no = idx + 2;
            report.rows_read += 1;

            let mapped = record
                .map_err(ImportError::from)
                .and_then(|row| map_row(row_no, row));
            let (production_date, machine_id, session, scan) = match mapped {
                Ok(mapped) => mapped,
                Err(e) => {
                    warn!(row = row_no, error = %e, "扫码日志行被拒绝");
                    report.rows_rejected.push((row_no, e.to_string()));
                    continue;
                }
            };

            self.scan_repo.upsert_session(production_date, &machine_id, &session)?;
            report.sessions_upserted += 1;
            if let Some(scan) = scan {
                self.scan_repo.append_scan(&session.session_id, &scan)?;
                report.scans_appended += 1;
            }
        }

        info!(
            rows_read = report.rows_read,
            scans_appended = report.scans_appended,
            rows_rejected = report.rows_rejected.len(),
            "扫码日志导入完成"
        );
        Ok(report)
    }
}

/// 从 JSON 文件导入工单
///
/// # 返回
/// 导入的工单数
pub fn import_work_orders(work_order_repo: &WorkOrderRepository, path: &Path) -> ImportResult<usize> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => {}
        other => return Err(ImportError::UnsupportedFormat(other.unwrap_or("").to_string())),
    }

    let raw = std::fs::read_to_string(path)?;
    let orders: Vec<WorkOrder> = serde_json::from_str(&raw)?;
    for order in &orders {
        work_order_repo.create(order)?;
    }
    info!(count = orders.len(), "工单导入完成");
    Ok(orders.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn repo() -> ScanLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ScanLogRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    const HEADER: &str =
        "production_date,machine_id,session_id,operator_id,operator_name,sign_in_at,sign_out_at,barcode_id,scanned_at";

    #[test]
    fn test_import_rows_and_sessions() {
        let repo = repo();
        let csv = format!(
            "{}\n\
             2026-03-02,M01,S1,OP1,张三,2026-03-02T08:00:00Z,,,\n\
             2026-03-02,M01,S1,OP1,张三,2026-03-02T08:00:00Z,,WO1-001-01-ABCD,2026-03-02T08:05:00Z\n\
             2026-03-02,M01,S1,OP1,张三,2026-03-02T08:00:00Z,2026-03-02T17:00:00Z,WO1-002-01-ABCD,2026-03-02T08:06:00Z\n",
            HEADER
        );

        let report = ScanLogImporter::new(&repo).import_reader(csv.as_bytes()).unwrap();
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.scans_appended, 2);
        assert!(report.rows_rejected.is_empty());

        let days = repo.find_by_work_order_key("WO1").unwrap();
        let session = &days[0].machines[0].sessions[0];
        assert_eq!(session.scans.len(), 2);
        assert!(session.sign_out_at.is_some());
    }

    #[test]
    fn test_bad_rows_are_rejected_not_fatal() {
        let repo = repo();
        let csv = format!(
            "{}\n\
             03/02/2026,M01,S1,OP1,张三,2026-03-02T08:00:00Z,,,\n\
             2026-03-02,M01,S1,OP1,张三,2026-03-02T08:00:00Z,,WO1-001-01-ABCD,\n\
             2026-03-02,M01,S1,OP1,张三,2026-03-02T08:00:00Z,,WO1-001-01-ABCD,2026-03-02T08:05:00Z\n",
            HEADER
        );

        let report = ScanLogImporter::new(&repo).import_reader(csv.as_bytes()).unwrap();
        assert_eq!(report.rows_rejected.len(), 2);
        assert_eq!(report.rows_rejected[0].0, 2);
        assert_eq!(report.scans_appended, 1);
    }
}
