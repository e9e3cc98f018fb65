//! Scheduler: owns the recurring scan timer and runs one scan cycle at a
//! time.
//!
//! A scan cycle re-reads pending items from the repository and pushes them
//! through the [`Pipeline`] strictly one after another, oldest first. Cycles
//! never overlap: the timer task awaits each cycle before waiting for the
//! next tick, and a cycle lock serialises `run_once`/`scan` against it.

use crate::config::Settings;
use crate::db::Repository;
use crate::error::Result;
use crate::model::Status;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::pipeline::{ItemReport, Pipeline};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the starts of consecutive scan cycles.
    pub interval: Duration,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.scan_interval(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Tally of one scan cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub discovered: usize,
    pub completed: usize,
    pub failed: usize,
    /// Items that could not be claimed.
    pub skipped: usize,
    /// Items left untouched because shutdown was requested.
    pub deferred: usize,
    pub items: Vec<ItemReport>,
}

struct Timer {
    cancel: CancellationToken,
    /// Unset while `start` is still running the first cycle.
    handle: Option<JoinHandle<()>>,
}

pub struct Scheduler<R> {
    pipeline: Arc<Pipeline<R>>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    timer: Arc<Mutex<Option<Timer>>>,
    cycle_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<R> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            config: self.config.clone(),
            running: Arc::clone(&self.running),
            timer: Arc::clone(&self.timer),
            cycle_lock: Arc::clone(&self.cycle_lock),
        }
    }
}

impl<R: Repository> Scheduler<R> {
    pub fn new(pipeline: Pipeline<R>, config: SchedulerConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config,
            running: Arc::new(AtomicBool::new(false)),
            timer: Arc::new(Mutex::new(None)),
            cycle_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Health check, one immediate scan cycle, then the recurring timer.
    ///
    /// A failed health check is returned and the scheduler stays stopped.
    /// A failed first scan is logged like any other cycle. If `stop()` is
    /// called at any point while this runs, nothing further is started.
    pub async fn start(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("scheduler already running");
            return Ok(());
        }

        // Installed before any await so stop() always has a token to cancel.
        let cancel = CancellationToken::new();
        *self.lock_timer() = Some(Timer {
            cancel: cancel.clone(),
            handle: None,
        });

        if let Err(e) = self.pipeline.repository().health_check().await {
            error!(error = %e, "repository health check failed");
            let mut timer = self.lock_timer();
            // After a stop() the slot and flag are no longer ours.
            if !cancel.is_cancelled() {
                *timer = None;
                self.running.store(false, Ordering::SeqCst);
            }
            return Err(e);
        }
        if cancel.is_cancelled() {
            info!("scheduler stopped during startup");
            return Ok(());
        }
        info!(interval_secs = self.config.interval.as_secs(), "scheduler started");

        self.logged_cycle(&cancel).await;

        // stop() cancels under the timer lock, so this check cannot race it.
        let mut timer = self.lock_timer();
        match timer.as_mut() {
            Some(timer) if !cancel.is_cancelled() => {
                let this = self.clone();
                let token = cancel.clone();
                timer.handle = Some(tokio::spawn(async move { this.tick_loop(token).await }));
            }
            _ => {}
        }
        Ok(())
    }

    /// Cancel the timer and wait for a cycle already in progress to finish.
    ///
    /// The item being processed when this is called runs to completion;
    /// items after it in the same cycle stay pending for the next run.
    pub async fn stop(&self) {
        if !self.is_running() {
            warn!("scheduler not running");
            return;
        }

        let timer = {
            let mut slot = self.lock_timer();
            let timer = slot.take();
            if let Some(timer) = &timer {
                timer.cancel.cancel();
            }
            // Cleared last, so a concurrent start() cannot install a new
            // timer before the old one is taken.
            self.running.store(false, Ordering::SeqCst);
            timer
        };
        if let Some(handle) = timer.and_then(|t| t.handle) {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task ended abnormally");
            }
        }
        // Covers the first cycle inside start() and any run_once() caller.
        drop(self.cycle_lock.lock().await);
        info!("scheduler stopped");
    }

    /// Health check plus exactly one scan cycle, without arming the timer.
    pub async fn run_once(&self) -> Result<CycleReport> {
        self.pipeline.repository().health_check().await?;
        self.scan().await
    }

    /// One scan cycle with nothing to cancel it.
    pub async fn scan(&self) -> Result<CycleReport> {
        self.scan_cycle(&CancellationToken::new()).await
    }

    async fn tick_loop(&self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(start, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.logged_cycle(&cancel).await,
            }
        }
    }

    async fn logged_cycle(&self, cancel: &CancellationToken) {
        if let Err(e) = self.scan_cycle(cancel).await {
            error!(error = %e, "scan cycle aborted, retrying at next tick");
        }
    }

    async fn scan_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let _guard = self.cycle_lock.lock().await;

        let pending = match self.pipeline.repository().list_pending().await {
            Ok(items) => items,
            Err(e) => {
                metrics::scan_cycles().add(1, &[KeyValue::new("result", "query_failed")]);
                return Err(e);
            }
        };
        metrics::scan_cycles().add(1, &[KeyValue::new("result", "ok")]);

        let mut report = CycleReport {
            discovered: pending.len(),
            ..CycleReport::default()
        };
        if pending.is_empty() {
            info!("no pending work items");
            return Ok(report);
        }
        info!(count = pending.len(), "scan cycle found pending work items");

        let mut items = pending.into_iter().peekable();
        while let Some(item) = items.next_if(|_| !cancel.is_cancelled()) {
            let item_report = self.pipeline.process(item).await;
            match &item_report {
                ItemReport::Finished { status, .. } if *status == Status::Completed => {
                    report.completed += 1
                }
                ItemReport::Finished { .. } => report.failed += 1,
                ItemReport::Skipped { .. } => report.skipped += 1,
            }
            report.items.push(item_report);
        }
        report.deferred = items.count();
        if report.deferred > 0 {
            info!(deferred = report.deferred, "shutdown requested, leaving remaining items pending");
        }

        info!(
            discovered = report.discovered,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "scan cycle finished"
        );
        Ok(report)
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<Timer>> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }
}
