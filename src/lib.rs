// ==========================================
// 成衣扫码同步系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 由机台扫码日志推断工单完工进度（只读对账，不改写日志）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则与后台任务
pub mod engine;

// 导入层 - 扫码日志与工单导入
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// SQL 计数与慢查询日志
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装与启动
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{InvalidScanReason, JobKind, OperationStatus, TickTrigger, WorkOrderStatus};

// 领域实体
pub use domain::{
    CompletionSnapshot, InvalidScan, Operation, OperatorSession, ProductionDay, ScanEvent, WorkOrder,
};

// 引擎
pub use engine::{
    CompletionInferenceEngine, EfficiencyAnalyzer, RetentionSweeper, ScanExtractor, SnapshotWriter,
    SyncOrchestrator,
};

// API
pub use api::{DashboardApi, SyncApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "成衣扫码同步系统";
