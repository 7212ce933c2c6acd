// ==========================================
// 成衣扫码同步系统 - 导入层
// ==========================================
// 职责: 扫码日志 CSV 与工单 JSON 导入（离线回放/初始化数据）
// ==========================================

pub mod error;
pub mod scan_log_importer;

pub use error::{ImportError, ImportResult};
pub use scan_log_importer::{import_work_orders, ScanImportReport, ScanLogImporter};
