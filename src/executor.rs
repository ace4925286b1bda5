//! Bounded concurrency executor
//!
//! Runs a batch of independent tasks with at most `concurrency` in flight.
//! Tasks report their own outcome (usually by sending it to a collector); the
//! error a task returns is logged and otherwise ignored, so one failing unit
//! never aborts its siblings. The executor's own error is reserved for
//! scheduling: it returns [`Error::Cancelled`] when cancellation stopped it
//! from dispatching every task, and [`Error::Internal`] when a task panicked.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Default number of tasks in flight
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Fixed-ceiling task runner
#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    concurrency: usize,
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl BoundedExecutor {
    /// Create an executor; a ceiling of zero is treated as one
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Concurrency ceiling
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task, keeping at most `concurrency` of them in flight
    ///
    /// Each task receives a clone of `cancel` and is expected to return
    /// promptly once it fires; running tasks are never aborted. Completion
    /// order is unspecified.
    pub async fn execute<F, Fut>(&self, cancel: &CancellationToken, tasks: Vec<F>) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.execute_with_report(cancel, tasks).await.result()
    }

    /// Like [`execute`](Self::execute), reporting which tasks ran
    pub async fn execute_with_report<F, Fut>(
        &self,
        cancel: &CancellationToken,
        tasks: Vec<F>,
    ) -> BatchReport
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let total = tasks.len();
        let mut pending = tasks.into_iter().enumerate();
        let mut in_flight = JoinSet::new();
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        // Positions dispatched but not yet returned; panics never return
        let mut unfinished = BTreeSet::new();

        debug!(total, concurrency = self.concurrency, "executing tasks");

        loop {
            while in_flight.len() < self.concurrency && !cancel.is_cancelled() {
                let Some((index, task)) = pending.next() else {
                    break;
                };
                let fut = task(cancel.clone());
                in_flight.spawn(async move { (index, fut.await) });
                unfinished.insert(index);
                report.dispatched += 1;
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok((index, Ok(()))) => {
                    unfinished.remove(&index);
                }
                Ok((index, Err(e))) => {
                    unfinished.remove(&index);
                    warn!(task = index, error = %e, "task returned an error");
                }
                Err(e) => {
                    error!(error = %e, "task panicked or was aborted");
                }
            }
        }

        report.panicked = unfinished.into_iter().collect();
        if report.dispatched < total {
            warn!(dispatched = report.dispatched, total, "cancelled before all tasks were dispatched");
        } else {
            debug!(total, panicked = report.panicked.len(), "all tasks completed");
        }
        report
    }
}

/// What happened to a batch
///
/// Tasks are dispatched in order, so the first `dispatched` tasks ran and
/// the rest never started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Tasks submitted
    pub total: usize,
    /// Tasks started
    pub dispatched: usize,
    /// Positions of tasks that panicked or were aborted
    pub panicked: Vec<usize>,
}

impl BatchReport {
    /// Whether the task at `position` was started
    pub const fn was_dispatched(&self, position: usize) -> bool {
        position < self.dispatched
    }

    /// Scheduling outcome
    ///
    /// [`Error::Cancelled`] when some tasks never started, otherwise
    /// [`Error::Internal`] when a task panicked.
    pub fn result(&self) -> Result<()> {
        if self.dispatched < self.total {
            return Err(Error::Cancelled);
        }
        if !self.panicked.is_empty() {
            return Err(Error::Internal(format!(
                "{} task(s) panicked",
                self.panicked.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_ceiling() {
        let executor = BoundedExecutor::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                move |_cancel: CancellationToken| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();

        executor
            .execute(&CancellationToken::new(), tasks)
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_task_errors_do_not_stop_batch() {
        let executor = BoundedExecutor::new(2);
        let completed = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let completed = Arc::clone(&completed);
                move |_cancel: CancellationToken| async move {
                    completed.fetch_add(1, Ordering::SeqCst);
                    if i % 2 == 0 {
                        Err(Error::Internal(format!("task {i} failed")))
                    } else {
                        Ok(())
                    }
                }
            })
            .collect();

        let result = executor.execute(&CancellationToken::new(), tasks).await;

        assert!(result.is_ok());
        assert_eq!(completed.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let executor = BoundedExecutor::new(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ran = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let ran = Arc::clone(&ran);
                move |_cancel: CancellationToken| async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();

        let result = executor.execute(&cancel, tasks).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_run_stops_dispatch_and_keeps_finished_work() {
        let executor = BoundedExecutor::new(1);
        let cancel = CancellationToken::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let ran = Arc::clone(&ran);
                move |cancel: CancellationToken| async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    if i == 1 {
                        cancel.cancel();
                    }
                    Ok(())
                }
            })
            .collect();

        let result = executor.execute(&cancel, tasks).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_ok() {
        let executor = BoundedExecutor::default();
        let tasks: Vec<fn(CancellationToken) -> std::future::Ready<Result<()>>> = Vec::new();
        assert!(executor.execute(&CancellationToken::new(), tasks).await.is_ok());
        assert_eq!(executor.concurrency(), DEFAULT_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let executor = BoundedExecutor::new(2);
        let ran = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let ran = Arc::clone(&ran);
                move |_cancel: CancellationToken| async move {
                    assert_ne!(i, 1, "task 1 blew up");
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();

        let report = executor
            .execute_with_report(&CancellationToken::new(), tasks)
            .await;

        assert_eq!(report.dispatched, 4);
        assert_eq!(report.panicked, vec![1]);
        assert!(matches!(report.result(), Err(Error::Internal(_))));
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_marks_undispatched_tasks() {
        let executor = BoundedExecutor::new(1);
        let cancel = CancellationToken::new();

        let tasks: Vec<_> = (0..3)
            .map(|i| {
                move |cancel: CancellationToken| async move {
                    if i == 0 {
                        cancel.cancel();
                    }
                    Ok(())
                }
            })
            .collect();

        let report = executor.execute_with_report(&cancel, tasks).await;

        assert!(report.was_dispatched(0));
        assert!(!report.was_dispatched(1));
        assert!(report.panicked.is_empty());
        assert!(matches!(report.result(), Err(Error::Cancelled)));
    }
}
