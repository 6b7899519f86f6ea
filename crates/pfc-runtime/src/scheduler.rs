//! Recurring evaluation scheduler.
//!
//! Three independent tokio tasks share one shutdown signal:
//! - batch evaluation every `evaluation_interval` (first run on start)
//! - daily reset at `daily_reset_hour_utc`
//! - heartbeat every `heartbeat_interval` (first beat on start)
//!
//! Stop cancels pending ticks only. Work already in progress runs to
//! completion before its task exits, and `stop` waits for that. Until the
//! old tasks have exited the scheduler reports `stopping` and refuses to
//! start, so at most one set of loops is ever live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::orchestrator::Evaluator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub evaluation_interval: Duration,
    pub heartbeat_interval: Duration,
    /// 0-23.
    pub daily_reset_hour_utc: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// `true` from `start` until a `stop` has fully drained the old tasks.
    pub running: bool,
    /// Shutdown signalled, in-flight work still finishing.
    pub stopping: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub batches_run: u64,
    pub resets_run: u64,
    pub heartbeats: u64,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    resets: AtomicU64,
    heartbeats: AtomicU64,
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    started_at: DateTime<Utc>,
}

enum RunState {
    Idle,
    Running(RunHandle),
    Stopping { started_at: DateTime<Utc> },
}

pub struct Scheduler {
    evaluator: Arc<Evaluator>,
    settings: SchedulerSettings,
    counters: Arc<Counters>,
    run: Mutex<RunState>,
}

impl Scheduler {
    pub fn new(evaluator: Arc<Evaluator>, settings: SchedulerSettings) -> Self {
        Self {
            evaluator,
            settings,
            counters: Arc::new(Counters::default()),
            run: Mutex::new(RunState::Idle),
        }
    }

    /// Spawn the three recurring tasks. Returns `false` (and does nothing)
    /// if already running or still stopping. Must be called inside a tokio
    /// runtime.
    pub async fn start(&self) -> bool {
        let mut run = self.run.lock().await;
        match &*run {
            RunState::Idle => {}
            RunState::Running(_) => {
                warn!("scheduler start requested while already running");
                return false;
            }
            RunState::Stopping { .. } => {
                warn!("scheduler start requested while previous run is stopping");
                return false;
            }
        }

        let (tx, rx) = watch::channel(false);
        let tasks = vec![
            spawn_batch_loop(
                Arc::clone(&self.evaluator),
                Arc::clone(&self.counters),
                self.settings.evaluation_interval,
                rx.clone(),
            ),
            spawn_reset_loop(
                Arc::clone(&self.evaluator),
                Arc::clone(&self.counters),
                self.settings.daily_reset_hour_utc,
                rx.clone(),
            ),
            spawn_heartbeat(
                Arc::clone(&self.counters),
                self.settings.heartbeat_interval,
                rx,
            ),
        ];

        *run = RunState::Running(RunHandle {
            shutdown: tx,
            tasks,
            started_at: Utc::now(),
        });

        info!(
            evaluation_interval_secs = self.settings.evaluation_interval.as_secs(),
            heartbeat_interval_secs = self.settings.heartbeat_interval.as_secs(),
            daily_reset_hour_utc = self.settings.daily_reset_hour_utc,
            "scheduler started"
        );
        true
    }

    /// Signal shutdown and wait for the tasks to exit. Returns `false` if
    /// the scheduler was not running (or another `stop` is already draining
    /// it).
    pub async fn stop(&self) -> bool {
        let handle = {
            let mut run = self.run.lock().await;
            match std::mem::replace(&mut *run, RunState::Idle) {
                RunState::Running(handle) => {
                    *run = RunState::Stopping {
                        started_at: handle.started_at,
                    };
                    handle
                }
                other => {
                    *run = other;
                    return false;
                }
            }
        };

        // Drained without the lock; `start` sees `Stopping` until every task exits.
        let _ = handle.shutdown.send(true);
        for task in handle.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "scheduler task ended abnormally");
            }
        }

        *self.run.lock().await = RunState::Idle;
        info!("scheduler stopped");
        true
    }

    pub async fn status(&self) -> SchedulerStatus {
        let run = self.run.lock().await;
        let (running, stopping, started_at) = match &*run {
            RunState::Idle => (false, false, None),
            RunState::Running(h) => (true, false, Some(h.started_at)),
            RunState::Stopping { started_at } => (true, true, Some(*started_at)),
        };
        SchedulerStatus {
            running,
            stopping,
            started_at,
            batches_run: self.counters.batches.load(Ordering::Relaxed),
            resets_run: self.counters.resets.load(Ordering::Relaxed),
            heartbeats: self.counters.heartbeats.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

fn spawn_batch_loop(
    evaluator: Arc<Evaluator>,
    counters: Arc<Counters>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            match evaluator.evaluate_all().await {
                Ok(s) => info!(
                    evaluated = s.evaluated,
                    successes = s.successes,
                    failures = s.failures,
                    unchanged = s.unchanged,
                    errors = s.errors,
                    "batch evaluation complete"
                ),
                Err(e) => error!(error = %e, "batch evaluation failed"),
            }
            counters.batches.fetch_add(1, Ordering::Relaxed);
        }
    })
}

fn spawn_reset_loop(
    evaluator: Arc<Evaluator>,
    counters: Arc<Counters>,
    reset_hour_utc: u32,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Only the first deadline is read off the wall clock; later ones are
        // carried forward on the monotonic clock so an early wake-up can
        // never schedule a second reset inside the same cycle.
        let mut deadline = Instant::now() + until_next_reset(Utc::now(), reset_hour_utc);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep_until(deadline) => {}
            }

            if let Err(e) = evaluator.reset_daily_metrics(None).await {
                error!(error = %e, "daily reset failed");
            }
            counters.resets.fetch_add(1, Ordering::Relaxed);

            deadline = following_reset(
                deadline,
                Instant::now(),
                until_next_reset(Utc::now(), reset_hour_utc),
            );
        }
    })
}

fn spawn_heartbeat(
    counters: Arc<Counters>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            let beats = counters.heartbeats.fetch_add(1, Ordering::Relaxed) + 1;
            info!(
                beats,
                batches_run = counters.batches.load(Ordering::Relaxed),
                resets_run = counters.resets.load(Ordering::Relaxed),
                "scheduler heartbeat"
            );
        }
    })
}

/// Deadline of the reset after the one that was due at `fired`: one day
/// later, unless the loop fell a whole day behind, in which case it resyncs
/// to `now + resync`.
fn following_reset(fired: Instant, now: Instant, resync: Duration) -> Instant {
    let next = fired + DAY;
    if next > now {
        next
    } else {
        now + resync
    }
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Time from `now` until the next `hour:00:00` UTC strictly after `now`.
pub fn until_next_reset(now: DateTime<Utc>, hour: u32) -> Duration {
    let today = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .map(|dt| dt.and_utc());
    let Some(today) = today else {
        return DAY;
    };

    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
