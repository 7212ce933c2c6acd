// ==========================================
// 成衣扫码同步系统 - 条码编解码
// ==========================================
// 格式: <工单短键>-<件号:3位>-<工序号:2位>-<校验位:4位大写十六进制>
// 校验位: 对 "<短键>-<UUU>-<OO>" 做 31 进制滚动哈希 (i32 回绕)，
//        取绝对值低 16 位
// 说明: 短键本身可含连字符，解析从右向左进行
// ==========================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 件号上限（3 位）
pub const MAX_UNIT: u32 = 999;
/// 工序号上限（2 位）
pub const MAX_OPERATION: u32 = 99;

/// 条码解码错误
///
/// 格式错误与校验位错误分开归类，二者在审计中都记为 invalid_format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("条码格式错误: {0}")]
    Malformed(String),

    #[error("条码校验位不匹配: expected={expected}, actual={actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("编码参数越界: {field}={value}")]
    OutOfRange { field: &'static str, value: u32 },
}

/// 解码结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedBarcode {
    pub work_order_key: String,
    pub unit: u32,
    pub operation: u32,
    pub checksum: String,
}

/// 计算校验位
pub fn checksum(work_order_key: &str, unit: u32, operation: u32) -> String {
    let payload = format!("{}-{:03}-{:02}", work_order_key, unit, operation);
    checksum_of(&payload)
}

fn checksum_of(payload: &str) -> String {
    let mut hash: i32 = 0;
    for c in payload.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(c as i32);
    }
    format!("{:04X}", hash.unsigned_abs() & 0xFFFF)
}

/// 编码条码
pub fn encode(work_order_key: &str, unit: u32, operation: u32) -> Result<String, DecodeError> {
    if work_order_key.is_empty() || work_order_key.chars().any(char::is_whitespace) {
        return Err(DecodeError::Malformed(format!(
            "工单短键不能为空或含空白: '{}'",
            work_order_key
        )));
    }
    if !(1..=MAX_UNIT).contains(&unit) {
        return Err(DecodeError::OutOfRange { field: "unit", value: unit });
    }
    if !(1..=MAX_OPERATION).contains(&operation) {
        return Err(DecodeError::OutOfRange {
            field: "operation",
            value: operation,
        });
    }

    Ok(format!(
        "{}-{:03}-{:02}-{}",
        work_order_key,
        unit,
        operation,
        checksum(work_order_key, unit, operation)
    ))
}

/// 解码条码
///
/// # 返回
/// - Ok(DecodedBarcode): 格式与校验位均正确
/// - Err(DecodeError::Malformed): 不符合格式
/// - Err(DecodeError::ChecksumMismatch): 校验位错误
///
/// 件号是否超出工单数量由抽取器判定，这里只保证格式
pub fn decode(barcode_id: &str) -> Result<DecodedBarcode, DecodeError> {
    let mut parts = barcode_id.rsplitn(4, '-');
    let (checksum_part, operation_part, unit_part, key_part) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(o), Some(u), Some(k)) => (c, o, u, k),
            _ => {
                return Err(DecodeError::Malformed(format!(
                    "段数不足: '{}'",
                    barcode_id
                )))
            }
        };

    if key_part.is_empty() || key_part.chars().any(char::is_whitespace) {
        return Err(DecodeError::Malformed(format!("工单短键无效: '{}'", barcode_id)));
    }
    let unit = parse_fixed_digits(unit_part, 3)
        .ok_or_else(|| DecodeError::Malformed(format!("件号须为3位数字: '{}'", unit_part)))?;
    let operation = parse_fixed_digits(operation_part, 2)
        .ok_or_else(|| DecodeError::Malformed(format!("工序号须为2位数字: '{}'", operation_part)))?;
    if checksum_part.len() != 4
        || !checksum_part
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    {
        return Err(DecodeError::Malformed(format!(
            "校验位须为4位大写十六进制: '{}'",
            checksum_part
        )));
    }

    let expected = checksum_of(&format!("{}-{}-{}", key_part, unit_part, operation_part));
    if expected != checksum_part {
        return Err(DecodeError::ChecksumMismatch {
            expected,
            actual: checksum_part.to_string(),
        });
    }

    Ok(DecodedBarcode {
        work_order_key: key_part.to_string(),
        unit,
        operation,
        checksum: checksum_part.to_string(),
    })
}

/// 按从右向左的分段规则取出短键部分，不校验其余各段
///
/// 解码失败的条码仍需判断归属哪个工单；段数不足时返回 None
pub fn work_order_key_of(barcode_id: &str) -> Option<&str> {
    let key = barcode_id.rsplitn(4, '-').nth(3)?;
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn parse_fixed_digits(s: &str, width: usize) -> Option<u32> {
    if s.len() != width || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
