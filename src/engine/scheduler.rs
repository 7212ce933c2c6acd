// ==========================================
// 成衣扫码同步系统 - 后台调度
// ==========================================
// 职责: 周期触发同步/清理任务
// 机制:
// - Ticker 决定何时触发（生产用 tokio 定时器，测试用通道驱动）
// - 每次触发单独 spawn，超时运行的任务不阻塞下一次触发
// - 任务自身通过 SingleFlight 保证不重入，重叠的触发直接跳过
// - 任务 panic 或整轮失败以 alert=true 记录 error 日志
// ==========================================

use crate::config::SyncConfigReader;
use crate::engine::error::SyncResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

// ==========================================
// SingleFlight - 不可重入标记
// ==========================================

/// 原子标记：同一时刻最多一个执行者
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

/// 持有期间标记为运行中，drop 时释放
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试进入；已有执行者时返回 None
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flag: &self.running })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ==========================================
// Ticker - 触发源
// ==========================================

/// 触发源；返回 false 表示停止调度
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self) -> bool;
}

/// 固定周期触发（首次立即触发）
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// 按配置的同步间隔触发，每次等待前重新读取配置
///
/// 运行中修改同步间隔，在下一次等待时生效
pub struct ConfiguredIntervalTicker<C>
where
    C: SyncConfigReader,
{
    config: Arc<C>,
    fallback_secs: u64,
}

impl<C> ConfiguredIntervalTicker<C>
where
    C: SyncConfigReader,
{
    pub fn new(config: Arc<C>, fallback_secs: u64) -> Self {
        Self { config, fallback_secs }
    }
}

#[async_trait]
impl<C> Ticker for ConfiguredIntervalTicker<C>
where
    C: SyncConfigReader + 'static,
{
    async fn tick(&mut self) -> bool {
        let secs = match self.config.get_sync_interval_secs().await {
            Ok(secs) => secs,
            Err(e) => {
                warn!(error = %e, fallback_secs = self.fallback_secs, "读取同步间隔失败，使用默认值");
                self.fallback_secs
            }
        };
        tokio::time::sleep(Duration::from_secs(secs)).await;
        true
    }
}

/// 通道驱动触发：每收到一条消息触发一次，发送端全部关闭即停止
pub struct ChannelTicker {
    rx: mpsc::Receiver<()>,
}

/// 创建通道触发源
pub fn channel_ticker(buffer: usize) -> (mpsc::Sender<()>, ChannelTicker) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, ChannelTicker { rx })
}

#[async_trait]
impl Ticker for ChannelTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

// ==========================================
// BackgroundJob - 周期任务
// ==========================================

#[async_trait]
pub trait BackgroundJob: Send + Sync + 'static {
    /// 任务名（日志字段）
    fn job_name(&self) -> &'static str;

    /// 一次定时触发
    async fn run_scheduled(&self) -> SyncResult<()>;
}

/// 启动周期任务循环
///
/// # 返回
/// 调度循环的 JoinHandle；Ticker 停止后循环退出
pub fn spawn_periodic<J, T>(job: Arc<J>, mut ticker: T) -> JoinHandle<()>
where
    J: BackgroundJob,
    T: Ticker + 'static,
{
    tokio::spawn(async move {
        let job_name = job.job_name();
        info!(job = job_name, "后台任务循环启动");

        while ticker.tick().await {
            debug!(job = job_name, "触发后台任务");
            let job = job.clone();
            let handle = tokio::spawn(async move { job.run_scheduled().await });
            tokio::spawn(supervise(job_name, handle));
        }

        info!(job = job_name, "后台任务循环停止");
    })
}

/// 等待单次任务结束，记录逃逸的错误
async fn supervise(job_name: &'static str, handle: JoinHandle<SyncResult<()>>) {
    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(alert = true, job = job_name, error = %e, "后台任务执行失败");
        }
        Err(join_err) => {
            error!(alert = true, job = job_name, error = %join_err, "后台任务异常终止");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::SyncError;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_single_flight_guard_releases_on_drop() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().unwrap();
        assert!(flight.is_running());
        assert!(flight.try_acquire().is_none());
        drop(guard);
        assert!(!flight.is_running());
        assert!(flight.try_acquire().is_some());
    }

    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl BackgroundJob for CountingJob {
        fn job_name(&self) -> &'static str {
            "counting"
        }

        async fn run_scheduled(&self) -> SyncResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SyncError::InvalidConfig("boom".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_channel_ticker_drives_job_and_stops() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let (tx, ticker) = channel_ticker(4);
        let handle = spawn_periodic(job.clone(), ticker);

        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        // 失败的任务不会终止循环
        for _ in 0..50 {
            if job.runs.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }
}
