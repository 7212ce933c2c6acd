// ==========================================
// 成衣扫码同步系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 条码解码/数量越界不走错误通道，记为无效扫码
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 同步/清理任务错误
#[derive(Error, Debug)]
pub enum SyncError {
    // ===== 存储错误 =====
    #[error("仓储操作失败: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("配置无效: {0}")]
    InvalidConfig(String),

    // ===== 后台任务错误 =====
    #[error("后台任务异常终止 (job: {job}): {message}")]
    TaskAborted { job: String, message: String },
}

pub type SyncResult<T> = Result<T, SyncError>;
