//! Scheduler - 名前付き定期ジョブのドライバ
//!
//! # 構成
//! - ジョブごとの ticker タスク: `tokio::time::interval` で `Fire(name)` を送る
//! - 単一のドライバタスク: コマンドを受けてジョブを 1 つずつ実行（非プリエンプティブ）
//! - `watch` チャンネルで shutdown（実行中のジョブは最後まで走る）
//!
//! Ad-hoc runs go through the same command channel as ticks, so they are
//! serialized with the periodic ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::engine::Engine;
use crate::config::{BriefingConfig, SWEEP_JOB};
use crate::domain::EngineError;
use crate::ports::{Clock, SystemClock};

/// Name of the status briefing job.
pub const BRIEFING_JOB: &str = "briefing";

const COMMAND_BUFFER: usize = 32;

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a job now (also what the tickers send).
    Fire(String),
}

/// Result of one job run, for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job: String,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<(Arc<dyn PeriodicJob>, Duration)>,
    outcome_tx: Option<mpsc::UnboundedSender<JobOutcome>>,
    /// Stamps `JobOutcome::finished_at`; the system clock when unset.
    clock: Option<Arc<dyn Clock>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job with its own cadence. A later job with the same name wins.
    pub fn with_job(mut self, job: Arc<dyn PeriodicJob>, period: Duration) -> Self {
        self.jobs.retain(|(existing, _)| existing.name() != job.name());
        self.jobs.push((job, period));
        self
    }

    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<JobOutcome>) -> Self {
        self.outcome_tx = Some(tx);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|(job, _)| job.name().to_string()).collect()
    }

    /// Start the tickers and the driver.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let mut joins = Vec::with_capacity(self.jobs.len() + 1);
        let mut registry = HashMap::with_capacity(self.jobs.len());
        for (job, period) in self.jobs {
            let name = job.name().to_string();
            info!(task = %name, period_secs = period.as_secs(), "scheduling job");
            joins.push(tokio::spawn(ticker(
                name.clone(),
                period,
                command_tx.clone(),
                shutdown_rx.clone(),
            )));
            registry.insert(name, job);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        joins.push(tokio::spawn(driver(
            registry,
            command_rx,
            shutdown_rx,
            self.outcome_tx,
            clock,
        )));

        SchedulerHandle {
            command_tx,
            shutdown_tx,
            joins,
        }
    }
}

/// Handle to a running scheduler.
/// - `trigger()` で任意のジョブを即時実行
/// - `shutdown_and_join()` で全タスクの終了を待つ
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Queue an ad-hoc run of `job`.
    pub async fn trigger(&self, job: &str) -> Result<(), EngineError> {
        if *self.shutdown_tx.borrow() {
            return Err(EngineError::ShuttingDown);
        }
        self.command_tx
            .send(SchedulerCommand::Fire(job.to_string()))
            .await
            .map_err(|_| EngineError::ShuttingDown)
    }

    /// Stop taking new runs. The run in flight is not interrupted.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                error!(error = %err, "scheduler task panicked");
            }
        }
    }
}

async fn ticker(
    name: String,
    period: Duration,
    command_tx: mpsc::Sender<SchedulerCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = interval.tick() => {
                match command_tx.try_send(SchedulerCommand::Fire(name.clone())) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(task = %name, "driver busy, tick dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        }
    }
    debug!(task = %name, "ticker stopped");
}

async fn driver(
    jobs: HashMap<String, Arc<dyn PeriodicJob>>,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    outcome_tx: Option<mpsc::UnboundedSender<JobOutcome>>,
    clock: Arc<dyn Clock>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let command = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // 次のループで判定
                continue;
            }
            command = command_rx.recv() => command,
        };
        let Some(SchedulerCommand::Fire(name)) = command else {
            break;
        };

        let Some(job) = jobs.get(&name) else {
            warn!(task = %name, "unknown job");
            continue;
        };

        // Not raced against shutdown: a started run always finishes.
        let result = job.run().await;
        let error = match result {
            Ok(()) => {
                debug!(task = %name, "job finished");
                None
            }
            Err(err) => {
                warn!(task = %name, error = %err, "job failed");
                Some(err.to_string())
            }
        };
        if let Some(tx) = &outcome_tx {
            let _ = tx.send(JobOutcome {
                job: name,
                finished_at: clock.now(),
                error,
            });
        }
    }
    info!("scheduler stopped");
}

/// The state-transition sweep.
pub struct SweepJob {
    engine: Arc<Engine>,
}

impl SweepJob {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PeriodicJob for SweepJob {
    fn name(&self) -> &str {
        SWEEP_JOB
    }

    async fn run(&self) -> Result<(), EngineError> {
        let report = self.engine.run_sweep().await?;
        for failure in &report.failures {
            debug!(responsibility_id = %failure.id, error = %failure.error, "sweep failure");
        }
        Ok(())
    }
}

/// Logs a summary of open items when a briefing slot is enabled.
pub struct BriefingJob {
    engine: Arc<Engine>,
    briefing: BriefingConfig,
}

impl BriefingJob {
    pub fn new(engine: Arc<Engine>, briefing: BriefingConfig) -> Self {
        Self { engine, briefing }
    }
}

#[async_trait]
impl PeriodicJob for BriefingJob {
    fn name(&self) -> &str {
        BRIEFING_JOB
    }

    async fn run(&self) -> Result<(), EngineError> {
        if !self.briefing.any() {
            return Ok(());
        }
        let counts = self.engine.status().await?;
        info!(
            user_id = %self.engine.user_id(),
            morning = self.briefing.morning,
            evening = self.briefing.evening,
            open = counts.open(),
            due_now = counts.due_now,
            missed = counts.missed,
            "briefing"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingJob {
        name: &'static str,
        runs: AtomicUsize,
        fail: bool,
    }

    impl CountingJob {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                fail: false,
            })
        }
    }

    #[async_trait]
    impl PeriodicJob for CountingJob {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self) -> Result<(), EngineError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EngineError::ShuttingDown)
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_run_on_their_own_cadence() {
        let fast = CountingJob::new("fast");
        let slow = CountingJob::new("slow");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Scheduler::new()
            .with_job(fast.clone(), Duration::from_secs(10))
            .with_job(slow.clone(), Duration::from_secs(60))
            .with_outcomes(tx)
            .spawn();

        // ticks: fast at 0,10,20,30 / slow at 0
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(rx.recv().await.unwrap().job);
        }
        handle.shutdown_and_join().await;

        assert_eq!(seen.iter().filter(|j| *j == "slow").count(), 1);
        assert_eq!(seen.iter().filter(|j| *j == "fast").count(), 4);
        assert_eq!(slow.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_runs_job_immediately() {
        let job = CountingJob::new("sweep");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Scheduler::new()
            .with_job(job.clone(), Duration::from_secs(3600))
            .with_outcomes(tx)
            .spawn();

        rx.recv().await.unwrap(); // initial tick
        handle.trigger("sweep").await.unwrap();
        let outcome = rx.recv().await.unwrap();
        assert!(outcome.is_ok());
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);

        handle.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_job_is_reported_not_fatal() {
        let job = Arc::new(CountingJob {
            name: "flaky",
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Scheduler::new()
            .with_job(job.clone(), Duration::from_secs(5))
            .with_outcomes(tx)
            .spawn();

        assert!(!rx.recv().await.unwrap().is_ok());
        assert!(!rx.recv().await.unwrap().is_ok());
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn trigger_after_shutdown_is_rejected() {
        let handle = Scheduler::new().spawn();
        handle.request_shutdown();
        assert!(matches!(
            handle.trigger("sweep").await,
            Err(EngineError::ShuttingDown)
        ));
        handle.shutdown_and_join().await;
    }

    struct SlowJob {
        started: Arc<Notify>,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl PeriodicJob for SlowJob {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self) -> Result<(), EngineError> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_in_flight_run_finish() {
        let started = Arc::new(Notify::new());
        let job = Arc::new(SlowJob {
            started: started.clone(),
            finished: AtomicUsize::new(0),
        });
        let handle = Scheduler::new()
            .with_job(job.clone(), Duration::from_secs(3600))
            .spawn();

        started.notified().await;
        handle.shutdown_and_join().await;
        assert_eq!(job.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_are_stamped_by_the_injected_clock() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 4, 10, 6, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(at));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Scheduler::new()
            .with_job(CountingJob::new("sweep"), Duration::from_secs(3600))
            .with_outcomes(tx)
            .with_clock(clock.clone())
            .spawn();

        assert_eq!(rx.recv().await.unwrap().finished_at, at);

        clock.advance(chrono::Duration::minutes(5));
        handle.trigger("sweep").await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap().finished_at,
            at + chrono::Duration::minutes(5)
        );
        handle.shutdown_and_join().await;
    }

    #[test]
    fn duplicate_job_names_keep_the_last() {
        let scheduler = Scheduler::new()
            .with_job(CountingJob::new("sweep"), Duration::from_secs(1))
            .with_job(CountingJob::new("sweep"), Duration::from_secs(2));
        assert_eq!(scheduler.job_names(), vec!["sweep".to_string()]);
    }
}
