//! Periodic task scheduler.
//!
//! # Data Flow
//! ```text
//! add_task(expr, f) → Schedule::parse (rejects bad expressions now)
//!                   → TaskEntry stored under a TaskId
//!
//! start() → tick loop, once per second:
//!     seconds since last tick → due entries → invoke() on the JoinSet
//!
//! stop()  → loop exits (no further ticks) → InFlight
//!     InFlight::drain(deadline) → waits for running invocations
//! ```
//!
//! # Design Decisions
//! - One-second granularity, evaluated in the configured timezone
//! - A delayed tick catches up on the seconds it missed (bounded)
//! - Every invocation is its own tokio task; panics and errors stay there
//! - Stopping never interrupts running invocations; it only stops ticking

pub mod schedule;
pub mod task;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};

pub use schedule::{CronSchedule, Schedule, ScheduleError};
pub use task::{TaskError, TaskId, TaskOutcome, TaskResult};

use task::{Job, TaskEntry};

const TICK: Duration = Duration::from_secs(1);

/// Longest gap (in seconds) a single tick will catch up on.
const MAX_CATCH_UP_SECS: i64 = 60;

/// Background scheduler for recurring tasks.
pub struct Scheduler {
    timezone: FixedOffset,
    tasks: DashMap<TaskId, TaskEntry>,
    next_id: AtomicU64,
    stop_tx: watch::Sender<bool>,
    tick_loop: Mutex<Option<JoinHandle<JoinSet<TaskOutcome>>>>,
}

impl Scheduler {
    /// Create a scheduler evaluating schedules in `timezone`.
    pub fn new(timezone: FixedOffset) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            timezone,
            tasks: DashMap::new(),
            next_id: AtomicU64::new(1),
            stop_tx,
            tick_loop: Mutex::new(None),
        }
    }

    /// Scheduler evaluating in UTC.
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// Register a synchronous callback, named after its id.
    pub fn add_task<F>(&self, expr: &str, callback: F) -> Result<TaskId, ScheduleError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert(None, expr, Job::blocking(callback))
    }

    /// Register a synchronous callback under a name used in logs and metrics.
    pub fn add_named_task<F>(
        &self,
        name: impl Into<String>,
        expr: &str,
        callback: F,
    ) -> Result<TaskId, ScheduleError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert(Some(name.into()), expr, Job::blocking(callback))
    }

    /// Register an async callback. An `Err` result is logged as a task failure.
    pub fn add_async_task<F, Fut>(
        &self,
        name: impl Into<String>,
        expr: &str,
        callback: F,
    ) -> Result<TaskId, ScheduleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.insert(Some(name.into()), expr, Job::from_async(callback))
    }

    fn insert(&self, name: Option<String>, expr: &str, job: Job) -> Result<TaskId, ScheduleError> {
        let schedule = Schedule::parse(expr)?;
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = name.unwrap_or_else(|| id.to_string());

        tracing::debug!(task = %name, id = %id, schedule = expr, "Task registered");
        self.tasks.insert(id, TaskEntry::new(name, schedule, job));
        Ok(id)
    }

    /// Unregister a task. Invocations already running are unaffected.
    pub fn remove_task(&self, id: TaskId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether the tick loop is currently running.
    pub fn is_running(&self) -> bool {
        lock(&self.tick_loop).is_some() && !*self.stop_tx.borrow()
    }

    /// Spawn the tick loop. Returns `false` if it was already started or
    /// the scheduler has been stopped.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = lock(&self.tick_loop);
        if slot.is_some() || *self.stop_tx.borrow() {
            tracing::warn!("Scheduler start ignored: already started or stopped");
            return false;
        }

        let stop_rx = self.stop_tx.subscribe();
        *slot = Some(tokio::spawn(Arc::clone(self).tick_loop(stop_rx)));

        tracing::info!(tasks = self.len(), timezone = %self.timezone, "Scheduler started");
        true
    }

    /// Stop ticking.
    ///
    /// Returns after the loop has exited, so no tick is evaluated once this
    /// resolves. Running invocations are handed back for draining.
    pub async fn stop(&self) -> InFlight {
        self.stop_tx.send_replace(true);
        let handle = lock(&self.tick_loop).take();

        let running = match handle {
            Some(handle) => match handle.await {
                Ok(running) => running,
                Err(e) => {
                    tracing::error!(error = %e, "Scheduler loop ended abnormally");
                    JoinSet::new()
                }
            },
            None => JoinSet::new(),
        };

        tracing::info!(in_flight = running.len(), "Scheduler stopped");
        InFlight { running }
    }

    async fn tick_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) -> JoinSet<TaskOutcome> {
        let mut running = JoinSet::new();
        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_evaluated = Utc::now().timestamp() - 1;

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                _ = ticker.tick() => {
                    let now = Utc::now().timestamp();
                    if now < last_evaluated - 1 {
                        tracing::warn!(from = last_evaluated, to = now, "Wall clock moved backwards");
                        last_evaluated = now - 1;
                    }
                    if now > last_evaluated {
                        let from = (last_evaluated + 1).max(now - MAX_CATCH_UP_SECS + 1);
                        for (name, job) in self.collect_due(from, now) {
                            running.spawn(task::invoke(name, job));
                        }
                        last_evaluated = now;
                    }
                }
                Some(_) = running.join_next(), if !running.is_empty() => {}
            }
        }

        running
    }

    /// Entries due in `from..=to`, each at most once.
    fn collect_due(&self, from: i64, to: i64) -> Vec<(String, Job)> {
        let mut due = Vec::new();
        for mut entry in self.tasks.iter_mut() {
            if entry.is_due(from, to, &self.timezone) {
                due.push((entry.name.clone(), entry.job.clone()));
            }
        }
        due
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("timezone", &self.timezone)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Invocations still running when the scheduler stopped.
pub struct InFlight {
    running: JoinSet<TaskOutcome>,
}

impl InFlight {
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Wait for running invocations, up to `deadline`.
    ///
    /// Returns how many were still running at the deadline; those are left
    /// to finish on their own and do not hold up process exit (see
    /// [`crate::lifecycle::runtime`]).
    pub async fn drain(mut self, deadline: Duration) -> usize {
        let all_done = async {
            while self.running.join_next().await.is_some() {}
        };
        if time::timeout(deadline, all_done).await.is_ok() {
            return 0;
        }

        let abandoned = self.running.len();
        tracing::warn!(abandoned, "Scheduled tasks still running after drain deadline");
        self.running.detach_all();
        abandoned
    }
}

async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ts(s: &str) -> i64 {
        chrono::DateTime::parse_from_rfc3339(s).unwrap().timestamp()
    }

    #[test]
    fn malformed_expression_rejected_at_registration() {
        let scheduler = Scheduler::utc();
        assert!(scheduler.add_task("* * * * * * *", || {}).is_err());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn catch_up_fires_once_per_evaluation() {
        let scheduler = Scheduler::utc();
        scheduler.add_named_task("minutely", "0 * * * * *", || {}).unwrap();
        scheduler.add_named_task("never-now", "30 0 0 1 1 *", || {}).unwrap();

        // 12:33:58..=12:34:02 crosses one minute boundary.
        let due = scheduler.collect_due(ts("2024-03-01T12:33:58Z"), ts("2024-03-01T12:34:02Z"));
        let names: Vec<_> = due.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["minutely"]);

        let none = scheduler.collect_due(ts("2024-03-01T12:34:03Z"), ts("2024-03-01T12:34:59Z"));
        assert!(none.is_empty());
    }

    #[test]
    fn schedules_use_scheduler_timezone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let scheduler = Scheduler::new(tokyo);
        scheduler.add_task("0 0 9 * * *", || {}).unwrap();

        // 00:00 UTC is 09:00 in UTC+9.
        let at = ts("2024-03-01T00:00:00Z");
        assert_eq!(scheduler.collect_due(at, at).len(), 1);
    }

    #[test]
    fn every_interval_counts_from_first_evaluation() {
        let scheduler = Scheduler::utc();
        scheduler.add_task("@every 10s", || {}).unwrap();

        assert!(scheduler.collect_due(100, 100).is_empty());
        assert!(scheduler.collect_due(101, 109).is_empty());
        assert_eq!(scheduler.collect_due(110, 110).len(), 1);
        assert!(scheduler.collect_due(111, 111).is_empty());
    }

    #[test]
    fn oversized_interval_rejected_at_registration() {
        let scheduler = Scheduler::utc();
        assert!(scheduler.add_task("@every 9223372036854775807s", || {}).is_err());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn longest_interval_evaluates_near_end_of_time() {
        let scheduler = Scheduler::utc();
        scheduler.add_task("@every 8784h", || {}).unwrap();

        let late = i64::MAX - 10;
        assert!(scheduler.collect_due(late, late).is_empty());
        assert!(scheduler.collect_due(late + 1, late + 5).is_empty());
        assert_eq!(scheduler.collect_due(i64::MAX, i64::MAX).len(), 1);
    }

    #[test]
    fn removed_task_no_longer_due() {
        let scheduler = Scheduler::utc();
        let id = scheduler.add_task("* * * * * *", || {}).unwrap();
        assert!(scheduler.remove_task(id));
        assert!(!scheduler.remove_task(id));
        assert!(scheduler.collect_due(0, 5).is_empty());
    }

    #[tokio::test]
    async fn stop_before_start_is_harmless() {
        let scheduler = Arc::new(Scheduler::utc());
        assert!(scheduler.stop().await.is_empty());
        assert!(!scheduler.start());
        assert!(scheduler.stop().await.is_empty());
    }

    #[tokio::test]
    async fn no_ticks_after_stop() {
        let scheduler = Arc::new(Scheduler::utc());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        scheduler
            .add_task("* * * * * *", move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(scheduler.start());
        assert!(!scheduler.start());
        time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(scheduler.stop().await.drain(Duration::from_secs(1)).await, 0);
        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "ran {after_stop} times");

        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn drain_reports_abandoned_invocations() {
        let scheduler = Arc::new(Scheduler::utc());
        scheduler
            .add_async_task("slow", "* * * * * *", || async {
                time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .unwrap();

        scheduler.start();
        time::sleep(Duration::from_millis(300)).await;

        let in_flight = scheduler.stop().await;
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight.drain(Duration::from_millis(100)).await, 1);
    }
}
