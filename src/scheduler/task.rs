//! Registered tasks and their per-invocation failure boundary.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{FixedOffset, TimeZone};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::observability::metrics;
use crate::scheduler::schedule::Schedule;

/// Error returned by an async task body.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one async task invocation.
pub type TaskResult = Result<(), TaskError>;

/// Handle returned by registration; used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// The callable part of a task.
#[derive(Clone)]
pub(crate) enum Job {
    /// Synchronous callback, run on the blocking pool.
    Blocking(Arc<dyn Fn() + Send + Sync>),
    /// Asynchronous callback.
    Async(Arc<dyn Fn() -> BoxFuture<'static, TaskResult> + Send + Sync>),
}

impl Job {
    pub(crate) fn blocking<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Job::Blocking(Arc::new(f))
    }

    pub(crate) fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Job::Async(Arc::new(move || f().boxed()))
    }
}

/// A task plus the bookkeeping needed to decide when it is due.
pub(crate) struct TaskEntry {
    pub(crate) name: String,
    pub(crate) schedule: Schedule,
    pub(crate) job: Job,
    /// Unix second of the next `@every` firing; set on first evaluation.
    pub(crate) next_due: Option<i64>,
}

impl TaskEntry {
    pub(crate) fn new(name: String, schedule: Schedule, job: Job) -> Self {
        Self {
            name,
            schedule,
            job,
            next_due: None,
        }
    }

    /// Whether the task fires for any second in `from..=to` (Unix seconds).
    ///
    /// A task fires at most once per call, however many seconds match.
    pub(crate) fn is_due(&mut self, from: i64, to: i64, timezone: &FixedOffset) -> bool {
        match &self.schedule {
            Schedule::Cron(cron) => (from..=to).any(|second| {
                timezone
                    .timestamp_opt(second, 0)
                    .single()
                    .is_some_and(|at| cron.matches(&at))
            }),
            Schedule::Every(interval) => {
                let interval = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX);
                match self.next_due {
                    Some(next) if to < next => false,
                    Some(_) => {
                        self.next_due = Some(to.saturating_add(interval));
                        true
                    }
                    None => {
                        self.next_due = Some(to.saturating_add(interval));
                        false
                    }
                }
            }
        }
    }
}

/// How a single invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    Panicked,
}

impl TaskOutcome {
    fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Panicked => "panicked",
        }
    }
}

/// Run one invocation on its own tokio task and translate how it ended.
///
/// The inner task isolates panics: they surface here as a `JoinError`
/// and never reach the scheduler loop.
pub(crate) async fn invoke(name: String, job: Job) -> TaskOutcome {
    let joined = match job {
        Job::Blocking(f) => tokio::task::spawn_blocking(move || f()).await.map(|()| Ok(())),
        Job::Async(f) => tokio::spawn(f()).await,
    };

    let outcome = match joined {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
        Err(e) if e.is_panic() => TaskOutcome::Panicked,
        Err(e) => TaskOutcome::Failed(e.to_string()),
    };

    match &outcome {
        TaskOutcome::Completed => tracing::debug!(task = %name, "Scheduled task completed"),
        TaskOutcome::Failed(error) => {
            tracing::warn!(task = %name, error = %error, "Scheduled task failed")
        }
        TaskOutcome::Panicked => tracing::error!(task = %name, "Scheduled task panicked"),
    }
    metrics::record_task_run(&name, outcome.label());
    outcome
}
