// ==========================================
// 成衣扫码同步系统 - 行字段编解码
// ==========================================
// 职责: 时间/日期字段在 TEXT 列与 chrono 类型之间的统一转换
// 约定: 时间戳统一为 RFC3339 UTC 毫秒精度（字典序 = 时间序）
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 时间戳 → TEXT
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 日期 → TEXT
pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// TEXT → 时间戳
pub fn parse_ts(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: format!("无法解析时间 '{}': {}", raw, e),
        })
}

/// 可空 TEXT → 时间戳
pub fn parse_opt_ts(field: &str, raw: Option<String>) -> RepositoryResult<Option<DateTime<Utc>>> {
    match raw {
        Some(s) if !s.trim().is_empty() => parse_ts(field, &s).map(Some),
        _ => Ok(None),
    }
}

/// TEXT → 日期
pub fn parse_date(field: &str, raw: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| {
        RepositoryError::FieldValueError {
            field: field.to_string(),
            message: format!("无法解析日期 '{}': {}", raw, e),
        }
    })
}
