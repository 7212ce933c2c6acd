// ==========================================
// 成衣扫码同步系统 - 引擎层
// ==========================================
// 职责: 条码解码、扫码校验、完工推断、效率分析、快照合并、后台调度
// 红线: Engine 不拼 SQL，存储访问只经 repositories 中的 trait
// ==========================================

pub mod barcode;
pub mod completion;
pub mod efficiency;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod repositories;
pub mod retention;
pub mod scheduler;
pub mod snapshot_writer;

// 重导出核心引擎
pub use barcode::{DecodeError, DecodedBarcode};
pub use completion::{advance_status, CompletionInferenceEngine, CompletionResult};
pub use efficiency::{AnalysisResult, EfficiencyAnalyzer};
pub use error::{SyncError, SyncResult};
pub use extractor::{ExtractionResult, ScanExtractor, ValidScan, ValidScanTree};
pub use orchestrator::{
    StaleWorkOrder, SyncOrchestrator, TickOutcome, TickReport, WorkOrderFailure, WorkOrderSyncOutcome,
    WorkOrderSyncSummary,
};
pub use repositories::{NoOpRunRecorder, ScanStore, SyncRepositories, SyncRunRecorder, WorkOrderStore};
pub use retention::{RetentionOutcome, RetentionReport, RetentionSweeper, RETENTION_SWEEP_PERIOD};
pub use scheduler::{
    channel_ticker, spawn_periodic, BackgroundJob, ChannelTicker, ConfiguredIntervalTicker,
    IntervalTicker, SingleFlight, Ticker,
};
pub use snapshot_writer::{Recomputed, SnapshotWriter, SyncedState};
