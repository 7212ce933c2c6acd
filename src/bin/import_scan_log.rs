// Dev utility: load work orders (JSON) and/or scan log rows (CSV) into the database,
// optionally followed by one manual sync tick.
//
// Usage:
//   cargo run --bin import_scan_log -- <db_path> [--work-orders orders.json] [--scans log.csv] [--sync]

use garment_scan_sync::app::AppState;
use garment_scan_sync::engine::TickOutcome;
use garment_scan_sync::importer::{import_work_orders, ScanLogImporter};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    garment_scan_sync::logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: import_scan_log <db_path> [--work-orders FILE] [--scans FILE] [--sync]"))?;

    let mut work_orders: Option<PathBuf> = None;
    let mut scans: Option<PathBuf> = None;
    let mut run_sync = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--work-orders" => work_orders = args.next().map(PathBuf::from),
            "--scans" => scans = args.next().map(PathBuf::from),
            "--sync" => run_sync = true,
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }

    let state = AppState::new(db_path)?;

    if let Some(path) = work_orders {
        let count = import_work_orders(&state.work_order_repo, &path)?;
        println!("work_orders_imported={}", count);
    }

    if let Some(path) = scans {
        let report = ScanLogImporter::new(&state.scan_repo).import_file(&path)?;
        println!(
            "rows_read={} scans_appended={} rows_rejected={}",
            report.rows_read,
            report.scans_appended,
            report.rows_rejected.len()
        );
        for (row, reason) in &report.rows_rejected {
            println!("  row {}: {}", row, reason);
        }
    }

    if run_sync {
        match state.sync_api.trigger_sync().await? {
            TickOutcome::Completed(report) => println!(
                "sync run_id={} synced={} stale={} failed={}",
                report.run_id,
                report.synced.len(),
                report.stale.len(),
                report.failures.len()
            ),
            TickOutcome::Skipped => println!("sync skipped"),
        }
    }

    Ok(())
}
