// ==========================================
// 同步编排并发与故障隔离测试
// ==========================================
// 职责: 验证不重入、单工单失败隔离、整轮失败记录、调度循环存活
// ==========================================

#[path = "helpers/test_data_builder.rs"]
mod test_data_builder;

#[cfg(test)]
mod orchestrator_concurrency_test {
    use chrono::{DateTime, NaiveDate, Utc};
    use garment_scan_sync::config::SyncSettings;
    use garment_scan_sync::domain::scan::{MachineDay, OperatorSession, ProductionDay, ScanEvent};
    use garment_scan_sync::domain::snapshot::{CompletionSnapshot, InvalidScan};
    use garment_scan_sync::domain::types::{JobKind, TickTrigger, WorkOrderStatus};
    use garment_scan_sync::domain::work_order::WorkOrder;
    use garment_scan_sync::engine::{
        channel_ticker, spawn_periodic, ScanStore, SyncOrchestrator, SyncRepositories, SyncRunRecorder,
        TickOutcome, WorkOrderStore,
    };
    use garment_scan_sync::repository::{
        RepositoryError, RepositoryResult, RunCompletion, RunStatus, SaveOutcome, ScanPurgeStats,
        SyncStateWrite,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;

    use crate::test_data_builder::{base_date, base_time, bc, WorkOrderBuilder};

    // ==========================================
    // Mock 存储
    // ==========================================

    /// 内存扫码存储: 每个短键一台机台一个会话
    #[derive(Default)]
    struct MemoryScanStore {
        days: Mutex<Vec<(String, ProductionDay)>>,
        /// 查询这些短键时返回错误
        failing_keys: Vec<String>,
    }

    impl MemoryScanStore {
        fn with_scan(self, key: &str, machine_id: &str, barcode: &str) -> Self {
            let session = OperatorSession {
                session_id: format!("S-{}", key),
                operator_id: "OP1".to_string(),
                operator_name: "张三".to_string(),
                sign_in_at: base_time(),
                sign_out_at: None,
                scans: vec![ScanEvent {
                    barcode_id: barcode.to_string(),
                    timestamp: base_time() + chrono::Duration::seconds(30),
                    machine_id: machine_id.to_string(),
                    operator_id: "OP1".to_string(),
                    operator_name: "张三".to_string(),
                }],
            };
            let day = ProductionDay {
                production_date: base_date(),
                machines: vec![MachineDay {
                    machine_id: machine_id.to_string(),
                    sessions: vec![session],
                }],
            };
            self.days.lock().unwrap().push((key.to_string(), day));
            self
        }

        fn failing_on(mut self, key: &str) -> Self {
            self.failing_keys.push(key.to_string());
            self
        }
    }

    impl ScanStore for MemoryScanStore {
        fn find_scans_by_work_order_key(&self, work_order_key: &str) -> RepositoryResult<Vec<ProductionDay>> {
            if self.failing_keys.iter().any(|k| k == work_order_key) {
                return Err(RepositoryError::DatabaseQueryError("扫码表读取失败".to_string()));
            }
            Ok(self
                .days
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k == work_order_key)
                .map(|(_, d)| d.clone())
                .collect())
        }

        fn delete_days_before(&self, _cutoff: NaiveDate) -> RepositoryResult<ScanPurgeStats> {
            Ok(ScanPurgeStats::default())
        }
    }

    /// 首次查询时阻塞，直到测试放行
    struct BlockingScanStore {
        inner: MemoryScanStore,
        blocked_once: AtomicBool,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ScanStore for BlockingScanStore {
        fn find_scans_by_work_order_key(&self, work_order_key: &str) -> RepositoryResult<Vec<ProductionDay>> {
            if !self.blocked_once.swap(true, Ordering::SeqCst) {
                self.entered.lock().unwrap().send(()).unwrap();
                self.release
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(5))
                    .unwrap();
            }
            self.inner.find_scans_by_work_order_key(work_order_key)
        }

        fn delete_days_before(&self, cutoff: NaiveDate) -> RepositoryResult<ScanPurgeStats> {
            self.inner.delete_days_before(cutoff)
        }
    }

    #[derive(Default)]
    struct MemoryWorkOrderStore {
        orders: Vec<WorkOrder>,
        fail_list: bool,
        /// 模拟上游已在本轮期间改成该状态
        upstream_status: Option<WorkOrderStatus>,
        saved: Mutex<Vec<(String, WorkOrderStatus, CompletionSnapshot)>>,
    }

    impl WorkOrderStore for MemoryWorkOrderStore {
        fn list_by_statuses(&self, statuses: &[WorkOrderStatus]) -> RepositoryResult<Vec<WorkOrder>> {
            if self.fail_list {
                return Err(RepositoryError::DatabaseConnectionError("连接已断开".to_string()));
            }
            Ok(self
                .orders
                .iter()
                .filter(|o| statuses.contains(&o.status))
                .cloned()
                .collect())
        }

        fn filter_unregistered_invalid(
            &self,
            _work_order_id: &str,
            scans: &[InvalidScan],
        ) -> RepositoryResult<Vec<InvalidScan>> {
            Ok(scans.to_vec())
        }

        fn save_sync_state(&self, write: &SyncStateWrite<'_>) -> RepositoryResult<SaveOutcome> {
            if let Some(current) = self.upstream_status {
                return Ok(SaveOutcome::StatusChanged { current });
            }
            self.saved.lock().unwrap().push((
                write.work_order_id.to_string(),
                write.status,
                write.snapshot.clone(),
            ));
            Ok(SaveOutcome::Saved)
        }

        fn prune_invalid_ledger_before(&self, _cutoff: NaiveDate) -> RepositoryResult<usize> {
            Ok(0)
        }
    }

    /// 记录运行日志调用序列
    #[derive(Default)]
    struct RecordingRunRecorder {
        events: Mutex<Vec<String>>,
        statuses: Mutex<Vec<RunStatus>>,
    }

    impl SyncRunRecorder for RecordingRunRecorder {
        fn start_run(
            &self,
            job: JobKind,
            trigger: TickTrigger,
            _started_at: DateTime<Utc>,
        ) -> RepositoryResult<String> {
            let mut events = self.events.lock().unwrap();
            events.push(format!("start:{}:{}", job.as_str(), trigger.as_str()));
            Ok(format!("run-{}", events.len()))
        }

        fn finish_run(
            &self,
            run_id: &str,
            _completed_at: DateTime<Utc>,
            completion: &RunCompletion,
        ) -> RepositoryResult<()> {
            self.events.lock().unwrap().push(format!("finish:{}", run_id));
            self.statuses.lock().unwrap().push(completion.status());
            Ok(())
        }

        fn fail_run(&self, run_id: &str, _completed_at: DateTime<Utc>, error: &str) -> RepositoryResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("fail:{}:{}", run_id, error));
            self.statuses.lock().unwrap().push(RunStatus::Failed);
            Ok(())
        }
    }

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn order(id: &str, key: &str) -> WorkOrder {
        WorkOrderBuilder::new(id, key)
            .quantity(1)
            .operation("锁边", "M01", None)
            .build()
    }

    fn orchestrator(
        scan_store: Arc<dyn ScanStore>,
        work_order_store: Arc<MemoryWorkOrderStore>,
        recorder: Arc<RecordingRunRecorder>,
    ) -> Arc<SyncOrchestrator<SyncSettings>> {
        Arc::new(SyncOrchestrator::new(
            Arc::new(SyncSettings::default()),
            SyncRepositories::new(scan_store, work_order_store, recorder),
        ))
    }

    // ==========================================
    // 不重入
    // ==========================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_trigger_is_skipped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let scan_store = Arc::new(BlockingScanStore {
            inner: MemoryScanStore::default().with_scan("WO1", "M01", &bc("WO1", 1, 1)),
            blocked_once: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let work_orders = Arc::new(MemoryWorkOrderStore {
            orders: vec![order("1", "WO1")],
            ..Default::default()
        });
        let recorder = Arc::new(RecordingRunRecorder::default());
        let orchestrator = orchestrator(scan_store, work_orders.clone(), recorder.clone());

        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_tick(TickTrigger::Scheduled).await })
        };

        // 等第一轮进入扫码读取
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        assert!(orchestrator.is_running());

        let second = orchestrator.trigger_manual().await.unwrap();
        assert!(matches!(second, TickOutcome::Skipped));

        release_tx.send(()).unwrap();
        let first = first.await.unwrap().unwrap();
        match first {
            TickOutcome::Completed(report) => assert_eq!(report.synced.len(), 1),
            TickOutcome::Skipped => panic!("第一轮不应被跳过"),
        }
        assert!(!orchestrator.is_running());

        // 跳过的触发不产生运行记录
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start:SYNC:SCHEDULED".to_string(), "finish:run-1".to_string()]);
        assert_eq!(work_orders.saved.lock().unwrap().len(), 1);

        // 上一轮结束后可以再次触发
        let third = orchestrator.trigger_manual().await.unwrap();
        assert!(matches!(third, TickOutcome::Completed(_)));
    }

    // ==========================================
    // 故障隔离
    // ==========================================

    #[tokio::test]
    async fn test_one_failing_order_does_not_abort_tick() {
        let scan_store = Arc::new(
            MemoryScanStore::default()
                .with_scan("WO1", "M01", &bc("WO1", 1, 1))
                .with_scan("WO3", "M01", &bc("WO3", 1, 1))
                .failing_on("WO2"),
        );
        let work_orders = Arc::new(MemoryWorkOrderStore {
            orders: vec![order("1", "WO1"), order("2", "WO2"), order("3", "WO3")],
            ..Default::default()
        });
        let recorder = Arc::new(RecordingRunRecorder::default());
        let orchestrator = orchestrator(scan_store, work_orders.clone(), recorder.clone());

        let report = match orchestrator.trigger_manual().await.unwrap() {
            TickOutcome::Completed(report) => report,
            TickOutcome::Skipped => panic!("不应跳过"),
        };

        assert_eq!(report.total(), 3);
        assert_eq!(report.synced.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].work_order_id, "2");
        assert!(report.failures[0].error.contains("扫码表读取失败"));

        let saved = work_orders.saved.lock().unwrap();
        let saved_ids: Vec<&str> = saved.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(saved_ids, vec!["1", "3"]);
        assert!(saved.iter().all(|(_, status, _)| *status == WorkOrderStatus::Completed));

        assert_eq!(*recorder.statuses.lock().unwrap(), vec![RunStatus::Partial]);
    }

    #[tokio::test]
    async fn test_status_changed_upstream_is_reported_not_failed() {
        let scan_store = Arc::new(MemoryScanStore::default().with_scan("WO1", "M01", &bc("WO1", 1, 1)));
        let work_orders = Arc::new(MemoryWorkOrderStore {
            orders: vec![order("1", "WO1")],
            upstream_status: Some(WorkOrderStatus::Cancelled),
            ..Default::default()
        });
        let recorder = Arc::new(RecordingRunRecorder::default());
        let orchestrator = orchestrator(scan_store, work_orders.clone(), recorder.clone());

        let report = match orchestrator.trigger_manual().await.unwrap() {
            TickOutcome::Completed(report) => report,
            TickOutcome::Skipped => panic!("不应跳过"),
        };

        assert_eq!(report.total(), 1);
        assert!(report.synced.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(report.stale.len(), 1);
        assert_eq!(report.stale[0].observed_status, WorkOrderStatus::Ready);
        assert_eq!(report.stale[0].current_status, WorkOrderStatus::Cancelled);

        assert!(work_orders.saved.lock().unwrap().is_empty());
        assert_eq!(*recorder.statuses.lock().unwrap(), vec![RunStatus::Completed]);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_whole_tick() {
        let work_orders = Arc::new(MemoryWorkOrderStore {
            fail_list: true,
            ..Default::default()
        });
        let recorder = Arc::new(RecordingRunRecorder::default());
        let orchestrator = orchestrator(Arc::new(MemoryScanStore::default()), work_orders, recorder.clone());

        let result = orchestrator.trigger_manual().await;
        assert!(result.is_err());
        assert!(!orchestrator.is_running());

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], "start:SYNC:MANUAL");
        assert!(events[1].starts_with("fail:run-1:"));
        assert!(events[1].contains("连接已断开"));
    }

    // ==========================================
    // 调度循环
    // ==========================================

    #[tokio::test]
    async fn test_periodic_loop_survives_failing_ticks() {
        let work_orders = Arc::new(MemoryWorkOrderStore {
            fail_list: true,
            ..Default::default()
        });
        let recorder = Arc::new(RecordingRunRecorder::default());
        let orchestrator = orchestrator(Arc::new(MemoryScanStore::default()), work_orders, recorder.clone());

        let (tx, ticker) = channel_ticker(4);
        let handle = spawn_periodic(orchestrator, ticker);

        for round in 1..=3 {
            tx.send(()).await.unwrap();
            // 等本次触发执行完，避免与下一次重叠被跳过
            let mut waited = 0;
            while recorder.statuses.lock().unwrap().len() < round && waited < 200 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                waited += 1;
            }
        }

        drop(tx);
        handle.await.unwrap();

        // 三次触发都执行且都以失败记录，循环未因错误退出
        let statuses = recorder.statuses.lock().unwrap().clone();
        assert_eq!(statuses, vec![RunStatus::Failed; 3]);
    }
}
