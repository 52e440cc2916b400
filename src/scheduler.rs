//! Tiered background refresh.
//!
//! One loop owns three cadences (fast, comprehensive, team) and runs due jobs
//! one after another on its own task, so no job ever overlaps another or
//! itself. A job that outlives its interval just pushes its next run later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::Result;

/// One of the refresh tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Job {
    FastRefresh,
    ComprehensiveRefresh,
    TeamRefresh,
}

/// Executes a job. Errors are logged by the scheduler and never stop it.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: Job, limit: usize) -> Result<()>;
}

/// When each tier last started a run that has since completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceState {
    pub last_fast: Instant,
    pub last_comprehensive: Instant,
    pub last_team: Instant,
}

impl CadenceState {
    pub fn new(origin: Instant) -> Self {
        Self {
            last_fast: origin,
            last_comprehensive: origin,
            last_team: origin,
        }
    }

    /// Jobs whose interval has elapsed at `now`, fastest tier first.
    pub fn due(&self, now: Instant, config: &SchedulerConfig) -> Vec<Job> {
        [
            (Job::FastRefresh, self.last_fast, config.fast_interval()),
            (
                Job::ComprehensiveRefresh,
                self.last_comprehensive,
                config.comprehensive_interval(),
            ),
            (Job::TeamRefresh, self.last_team, config.team_interval()),
        ]
        .into_iter()
        .filter(|(_, last, interval)| now.saturating_duration_since(*last) >= *interval)
        .map(|(job, _, _)| job)
        .collect()
    }

    pub fn mark(&mut self, job: Job, at: Instant) {
        match job {
            Job::FastRefresh => self.last_fast = at,
            Job::ComprehensiveRefresh => self.last_comprehensive = at,
            Job::TeamRefresh => self.last_team = at,
        }
    }
}

pub struct Scheduler<R> {
    runner: Arc<R>,
    config: SchedulerConfig,
    state: CadenceState,
}

impl<R: JobRunner> Scheduler<R> {
    pub fn new(runner: Arc<R>, config: SchedulerConfig) -> Self {
        Self::starting_at(runner, config, Instant::now())
    }

    /// A scheduler whose cadences all count from `origin`.
    pub fn starting_at(runner: Arc<R>, config: SchedulerConfig, origin: Instant) -> Self {
        Self {
            runner,
            config,
            state: CadenceState::new(origin),
        }
    }

    pub fn state(&self) -> CadenceState {
        self.state
    }

    fn limit(&self, job: Job) -> usize {
        match job {
            Job::FastRefresh => self.config.fast_limit,
            Job::ComprehensiveRefresh | Job::TeamRefresh => self.config.comprehensive_limit,
        }
    }

    /// Run `job` to completion and stamp it with `started`, whatever the outcome.
    #[instrument(skip(self, started))]
    async fn run_job(&mut self, job: Job, started: Instant) {
        let limit = self.limit(job);
        match self.runner.run(job, limit).await {
            Ok(()) => info!(%job, elapsed_ms = started.elapsed().as_millis() as u64, "job finished"),
            Err(e) => error!(%job, kind = %e.kind(), error = %e, "job failed"),
        }
        self.state.mark(job, started);
    }

    /// Run every job due at `now`, sequentially.
    pub async fn tick(&mut self, now: Instant) {
        for job in self.state.due(now, &self.config) {
            self.run_job(job, now).await;
        }
    }

    /// Eager fast refresh, then poll until `shutdown` fires. A running job is
    /// always allowed to finish; cancellation is only observed between ticks.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            poll_secs = self.config.poll_interval_secs,
            fast_secs = self.config.fast_interval_secs,
            comprehensive_secs = self.config.comprehensive_interval_secs,
            team_secs = self.config.team_interval_secs,
            "scheduler started"
        );
        self.run_job(Job::FastRefresh, Instant::now()).await;

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick(Instant::now()).await,
            }
        }
        info!("scheduler stopped");
    }
}

static STARTED: AtomicBool = AtomicBool::new(false);

/// A running background scheduler.
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the loop to stop and wait for the current job to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
}

/// Spawn the background scheduler. Only the first call in a process starts
/// one; later calls log and return `None`.
pub fn start_scheduler<R>(runner: Arc<R>, config: SchedulerConfig) -> Option<SchedulerHandle>
where
    R: JobRunner + 'static,
{
    if STARTED.swap(true, Ordering::SeqCst) {
        warn!("scheduler already running, ignoring start request");
        return None;
    }
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(runner, config);
    let task = tokio::spawn(scheduler.run(shutdown.clone()));
    Some(SchedulerHandle { shutdown, task })
}
