//! Periodic background tasks.
//!
//! Tasks are synchronous (the ledger and key manager block on storage), so
//! each run is moved onto tokio's blocking pool. A failed or panicking run is
//! logged and the task simply runs again on its next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Smallest accepted period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// What one run of a task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Nothing was due.
    Idle,
    /// Work was done.
    Completed {
        /// One-line summary for the log.
        summary: String,
    },
}

/// A unit of periodic background work.
pub trait ScheduledTask: Send + Sync + 'static {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Run once. Called from a blocking thread.
    ///
    /// # Errors
    ///
    /// Any error is logged by the scheduler; the task runs again next tick.
    fn run(&self) -> RuntimeResult<TaskOutcome>;
}

/// Run `task` once on the blocking pool and wait for it.
///
/// # Errors
///
/// Returns the task's error, or [`RuntimeError::Task`] if it panicked.
pub async fn run_once(task: Arc<dyn ScheduledTask>) -> RuntimeResult<TaskOutcome> {
    let name = task.name();
    tokio::task::spawn_blocking(move || task.run())
        .await
        .map_err(|e| RuntimeError::Task {
            task: name,
            reason: e.to_string(),
        })?
}

/// Aborts the wrapped task when dropped.
///
/// A plain `JoinHandle` detaches on drop; this guard ties the task's life
/// to its owner.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owns the periodic loops. Dropping the scheduler stops every task.
#[derive(Default)]
pub struct TaskScheduler {
    tasks: Vec<(&'static str, AbortOnDrop)>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.task_names())
            .finish()
    }
}

impl TaskScheduler {
    /// An empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period`, starting immediately.
    ///
    /// Must be called from within a tokio runtime. Ticks missed while a run
    /// is still in progress are skipped, so runs never overlap.
    pub fn spawn(&mut self, task: Arc<dyn ScheduledTask>, period: Duration) {
        let name = task.name();
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match run_once(Arc::clone(&task)).await {
                    Ok(TaskOutcome::Idle) => debug!(task = name, "Nothing due"),
                    Ok(TaskOutcome::Completed { summary }) => {
                        info!(task = name, %summary, "Task run completed");
                    },
                    Err(e @ RuntimeError::Task { .. }) => {
                        error!(task = name, error = %e, "Task run aborted; retrying next tick");
                    },
                    Err(e) => warn!(task = name, error = %e, "Task run failed; retrying next tick"),
                }
            }
        });
        info!(task = name, period_secs = period.as_secs_f64(), "Scheduled background task");
        self.tasks.push((name, AbortOnDrop(handle)));
    }

    /// Names of the scheduled tasks, in spawn order.
    #[must_use]
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Number of scheduled tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every task.
    pub fn shutdown(self) {
        let count = self.tasks.len();
        drop(self);
        debug!(count, "Background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ScheduledTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn run(&self) -> RuntimeResult<TaskOutcome> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RuntimeError::Task {
                    task: "counter",
                    reason: "synthetic".into(),
                });
            }
            Ok(TaskOutcome::Idle)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_repeatedly_until_dropped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TaskScheduler::new();
        scheduler.spawn(
            Arc::new(Counter {
                runs: Arc::clone(&runs),
                fail: false,
            }),
            Duration::from_millis(20),
        );
        assert_eq!(scheduler.task_names(), vec!["counter"]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(runs.load(Ordering::SeqCst) >= 2);

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stopped_at = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failures_do_not_stop_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TaskScheduler::new();
        scheduler.spawn(
            Arc::new(Counter {
                runs: Arc::clone(&runs),
                fail: true,
            }),
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_run_once_returns_outcome() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn ScheduledTask> = Arc::new(Counter {
            runs: Arc::clone(&runs),
            fail: false,
        });
        assert_eq!(run_once(task).await.unwrap(), TaskOutcome::Idle);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
