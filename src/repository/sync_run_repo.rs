// ==========================================
// 成衣扫码同步系统 - 后台任务运行日志仓储
// ==========================================
// 职责: 记录每次同步/清理执行（触发方式、处理数、失败数、耗时）
// 用途: 运维面板查看最近执行；失败计数可被监控告警
// ==========================================

use crate::domain::types::{JobKind, TickTrigger};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{format_ts, parse_opt_ts, parse_ts};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// 执行中
    Running,
    /// 全部成功
    Completed,
    /// 部分失败
    Partial,
    /// 整体失败
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "RUNNING" => RunStatus::Running,
            "COMPLETED" => RunStatus::Completed,
            "PARTIAL" => RunStatus::Partial,
            _ => RunStatus::Failed,
        }
    }
}

/// 运行记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunEntity {
    pub run_id: String,
    pub job_kind: String,
    pub trigger_type: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub items_total: u32,
    pub items_succeeded: u32,
    pub items_failed: u32,
    pub detail: Option<String>,
}

/// 运行结束时写入的统计
#[derive(Debug, Clone, Default)]
pub struct RunCompletion {
    pub items_total: u32,
    pub items_succeeded: u32,
    pub items_failed: u32,
    pub detail: Option<String>,
}

impl RunCompletion {
    /// 由成功/失败数推导运行状态
    pub fn status(&self) -> RunStatus {
        if self.items_failed == 0 {
            RunStatus::Completed
        } else if self.items_succeeded > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

// ==========================================
// SyncRunRepository - 运行日志仓储
// ==========================================
pub struct SyncRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SyncRunRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 记录开始
    pub fn start_run(
        &self,
        job: JobKind,
        trigger: TickTrigger,
        started_at: DateTime<Utc>,
    ) -> RepositoryResult<String> {
        let run_id = Uuid::new_v4().to_string();
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO sync_run_log (run_id, job_kind, trigger_type, started_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                run_id,
                job.as_str(),
                trigger.as_str(),
                format_ts(&started_at),
                RunStatus::Running.as_str(),
            ],
        )?;
        Ok(run_id)
    }

    /// 记录结束
    pub fn finish_run(
        &self,
        run_id: &str,
        completed_at: DateTime<Utc>,
        completion: &RunCompletion,
    ) -> RepositoryResult<()> {
        self.finish_with_status(run_id, completed_at, completion.status(), completion)
    }

    /// 记录整体失败（如无法读取工单列表）
    pub fn fail_run(&self, run_id: &str, completed_at: DateTime<Utc>, error: &str) -> RepositoryResult<()> {
        let completion = RunCompletion {
            detail: Some(error.to_string()),
            ..Default::default()
        };
        self.finish_with_status(run_id, completed_at, RunStatus::Failed, &completion)
    }

    fn finish_with_status(
        &self,
        run_id: &str,
        completed_at: DateTime<Utc>,
        status: RunStatus,
        completion: &RunCompletion,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            UPDATE sync_run_log SET
                completed_at = ?2,
                status = ?3,
                items_total = ?4,
                items_succeeded = ?5,
                items_failed = ?6,
                detail = ?7
            WHERE run_id = ?1
            "#,
            params![
                run_id,
                format_ts(&completed_at),
                status.as_str(),
                completion.items_total,
                completion.items_succeeded,
                completion.items_failed,
                completion.detail,
            ],
        )?;
        Ok(())
    }

    /// 最近的运行记录（新→旧）
    pub fn list_recent(&self, job: JobKind, limit: usize) -> RepositoryResult<Vec<SyncRunEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, job_kind, trigger_type, started_at, completed_at, status,
                   items_total, items_succeeded, items_failed, detail
            FROM sync_run_log
            WHERE job_kind = ?1
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;

        let raw = stmt
            .query_map(params![job.as_str(), limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, u32>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        raw.into_iter()
            .map(
                |(run_id, job_kind, trigger_type, started, completed, status, total, ok, failed, detail)| {
                    Ok(SyncRunEntity {
                        run_id,
                        job_kind,
                        trigger_type,
                        started_at: parse_ts("started_at", &started)?,
                        completed_at: parse_opt_ts("completed_at", completed)?,
                        status: RunStatus::from_str(&status),
                        items_total: total,
                        items_succeeded: ok,
                        items_failed: failed,
                        detail,
                    })
                },
            )
            .collect()
    }
}
