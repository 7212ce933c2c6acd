// ==========================================
// 扫码日志保留期清理测试
// ==========================================
// 职责: 验证按保留期删除生产日、清理无效扫码指纹、快照不受影响
// ==========================================


#[path = "helpers/test_data_builder.rs"]
mod test_data_builder;

#[cfg(test)]
mod retention_test {
    use chrono::{Duration, NaiveDate};
    use garment_scan_sync::api::ApiError;
    use garment_scan_sync::app::AppState;
    use garment_scan_sync::domain::types::{JobKind, TickTrigger, WorkOrderStatus};
    use garment_scan_sync::engine::{RetentionOutcome, RetentionReport};
    use garment_scan_sync::repository::RunStatus;

    use crate::test_data_builder::{base_date, bc, SessionBuilder, WorkOrderBuilder};
    use crate::test_helpers::create_test_state;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    /// 默认保留 30 天；清理日取首个生产日后第 35 天
    fn sweep_day() -> NaiveDate {
        base_date() + Duration::days(35)
    }

    /// 第 0 天: 件1 + 一条无效扫码；第 10 天: 件2
    fn seed(state: &AppState) {
        state
            .work_order_repo
            .create(
                &WorkOrderBuilder::new("wo-1", "WO1")
                    .quantity(3)
                    .operation("锁边", "M01", Some(40.0))
                    .build(),
            )
            .unwrap();

        SessionBuilder::new("S-D0", "M01", "OP1")
            .scan_at(&bc("WO1", 1, 1), 30)
            .scan_at("WO1-001-01-ZZZZ", 60)
            .insert(&state.scan_repo);
        SessionBuilder::new("S-D10", "M01", "OP1")
            .on_date(base_date() + Duration::days(10))
            .scan_at(&bc("WO1", 2, 1), 30)
            .insert(&state.scan_repo);
    }

    async fn sweep(state: &AppState) -> RetentionReport {
        match state.sweeper.sweep(TickTrigger::Manual, sweep_day()).await.unwrap() {
            RetentionOutcome::Completed(report) => report,
            RetentionOutcome::Skipped => panic!("单线程测试中不应跳过"),
        }
    }

    // ==========================================
    // 清理范围
    // ==========================================

    #[tokio::test]
    async fn test_purges_days_older_than_retention_window() {
        let (_tmp, state) = create_test_state().unwrap();
        seed(&state);
        state.sync_api.trigger_sync().await.unwrap();
        assert_eq!(state.scan_repo.count_scans().unwrap(), 3);

        let report = sweep(&state).await;
        assert_eq!(report.retention_days, 30);
        assert_eq!(report.cutoff, base_date() + Duration::days(5));
        assert_eq!(report.days_deleted, 1);
        assert_eq!(report.sessions_deleted, 1);
        assert_eq!(report.scans_deleted, 2);
        assert_eq!(report.ledger_entries_pruned, 1);

        assert_eq!(state.scan_repo.count_scans().unwrap(), 1);
        let remaining = state.scan_repo.find_by_work_order_key("WO1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].production_date, base_date() + Duration::days(10));
    }

    #[tokio::test]
    async fn test_cutoff_day_itself_is_kept() {
        let (_tmp, state) = create_test_state().unwrap();
        SessionBuilder::new("S-CUT", "M01", "OP1")
            .on_date(sweep_day() - Duration::days(30))
            .scan_at(&bc("WO1", 1, 1), 30)
            .insert(&state.scan_repo);

        let report = sweep(&state).await;
        assert_eq!(report.days_deleted, 0);
        assert_eq!(state.scan_repo.count_scans().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_longer_retention_keeps_everything() {
        let (_tmp, state) = create_test_state().unwrap();
        seed(&state);
        state.sync_api.update_retention_days(60).await.unwrap();

        let report = sweep(&state).await;
        assert_eq!(report.retention_days, 60);
        assert_eq!(report.days_deleted, 0);
        assert_eq!(state.scan_repo.count_scans().unwrap(), 3);
    }

    // ==========================================
    // 快照不受清理影响
    // ==========================================

    #[tokio::test]
    async fn test_snapshot_survives_purge_and_resync() {
        let (_tmp, state) = create_test_state().unwrap();
        seed(&state);
        state.sync_api.trigger_sync().await.unwrap();

        let before = state.work_order_repo.find_by_id("wo-1").unwrap().unwrap();
        let before_snap = before.completion.clone().unwrap();
        assert_eq!(before_snap.overall_completed_quantity, 2);
        assert_eq!(before_snap.invalid_scans_count, 1);

        sweep(&state).await;

        // 清理本身不改写快照
        let after_purge = state.work_order_repo.find_by_id("wo-1").unwrap().unwrap();
        assert_eq!(after_purge.completion, before.completion);

        // 剩余日志只能推出 1 件，整单完成数仍为 2，无效计数不变
        state.sync_api.trigger_sync().await.unwrap();
        let after = state.work_order_repo.find_by_id("wo-1").unwrap().unwrap();
        let after_snap = after.completion.unwrap();
        assert_eq!(after_snap.overall_completed_quantity, 2);
        assert_eq!(after_snap.operations[0].completed_quantity, 2);
        assert_eq!(after_snap.invalid_scans_count, 1);
        assert_eq!(after_snap.invalid_scans, before_snap.invalid_scans);
        assert_eq!(after.status, WorkOrderStatus::InProgress);
        assert_eq!(after.timeline.production_started_at, before.timeline.production_started_at);
    }

    // ==========================================
    // 运行记录与配置校验
    // ==========================================

    #[tokio::test]
    async fn test_sweep_is_recorded_in_run_log() {
        let (_tmp, state) = create_test_state().unwrap();
        seed(&state);
        let report = sweep(&state).await;

        let runs = state.sync_api.list_recent_runs(JobKind::Retention, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, report.run_id);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].trigger_type, "MANUAL");
        assert!(runs[0].completed_at.is_some());

        assert!(state
            .sync_api
            .list_recent_runs(JobKind::Sync, 10)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_retention_must_cover_sync_interval() {
        let (_tmp, state) = create_test_state().unwrap();

        // 默认间隔 300 秒，保留 1 天仍足够
        let settings = state.sync_api.update_retention_days(1).await.unwrap();
        assert_eq!(settings.retention_days, 1);

        // 一天的间隔需要至少 4 天保留期
        let err = state.sync_api.update_sync_interval(86_400).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = state.sync_api.update_retention_days(0).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = state.sync_api.update_sync_interval(5).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        // 被拒绝的修改不落库
        let settings = state.sync_api.get_settings().await.unwrap();
        assert_eq!(settings.sync_interval_secs, 300);
        assert_eq!(settings.retention_days, 1);
    }
}
