//! Join-counter for labeled units of work.
//!
//! A [`TaskGroup`] spawns work either onto the tokio scheduler (concurrent
//! mode) or inline in the caller (sequential mode), counts how many units
//! are outstanding, and lets one party [`wait`](TaskGroup::wait) until all of
//! them have finished.
//!
//! ```text
//!   spawn("a") ──► outstanding 1 ─┐
//!   spawn("b") ──► outstanding 2  │   wait() suspends
//!   done("a")  ──► outstanding 1  │
//!   done("b")  ──► outstanding 0 ─┴─► waiter released
//! ```
//!
//! Each group is private to one suite or one tree level, so at most one
//! party ever waits on it. A panic inside spawned work is logged and the
//! unit is still counted as done.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::value::panic_message;

/// Locks a mutex, ignoring poisoning.
///
/// Callables run under `catch_unwind`, so a poisoned lock only means a
/// panic was already recorded elsewhere.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// When the advisory watcher reports outstanding work.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `initial` | 1 second |
/// | `interval` | 5 seconds |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSchedule {
    /// Delay before the first report.
    pub initial: Duration,

    /// Delay between subsequent reports.
    pub interval: Duration,
}

impl Default for WatchSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct GroupState {
    outstanding: usize,
    /// Label -> number of in-flight units carrying it.
    in_flight: BTreeMap<String, usize>,
}

/// Spawns labeled work and waits for all of it to complete.
///
/// Cloning a group yields another handle to the same counter.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use arbor::TaskGroup;
///
/// # tokio_test::block_on(async {
/// let group = TaskGroup::new(true);
/// let finished = Arc::new(AtomicUsize::new(0));
///
/// for i in 0..3 {
///     let finished = finished.clone();
///     group.spawn(format!("unit-{}", i), async move {
///         finished.fetch_add(1, Ordering::SeqCst);
///     }).await;
/// }
///
/// group.wait().await;
/// assert_eq!(finished.load(Ordering::SeqCst), 3);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TaskGroup {
    name: Arc<str>,
    concurrent: bool,
    state: Arc<Mutex<GroupState>>,
    released: Arc<Notify>,
}

impl TaskGroup {
    /// Creates an empty group.
    ///
    /// With `concurrent` set, spawned work runs as separate tokio tasks;
    /// otherwise [`spawn`](Self::spawn) runs it to completion before
    /// returning.
    pub fn new(concurrent: bool) -> Self {
        Self {
            name: Arc::from(""),
            concurrent,
            state: Arc::new(Mutex::new(GroupState::default())),
            released: Arc::new(Notify::new()),
        }
    }

    /// Sets the name used in diagnostics.
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Arc::from(name.as_ref());
        self
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether spawned work runs concurrently.
    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Number of units spawned but not yet done.
    pub fn outstanding(&self) -> usize {
        lock(&self.state).outstanding
    }

    /// Labels of the units still in flight, sorted.
    pub fn in_flight(&self) -> Vec<String> {
        lock(&self.state).in_flight.keys().cloned().collect()
    }

    /// Runs `work` as a unit of this group.
    ///
    /// The unit is counted as outstanding before `work` starts and marked
    /// done when it finishes, whether it completes or panics. A panic is
    /// logged and never reaches the spawner.
    pub async fn spawn<F>(&self, label: impl Into<String>, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        self.add(&label);

        if self.concurrent {
            let group = self.clone();
            tokio::spawn(async move {
                group.run_unit(label, work).await;
            });
        } else {
            self.run_unit(label, work).await;
        }
    }

    async fn run_unit<F>(&self, label: String, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let outcome = AssertUnwindSafe(work).catch_unwind().await;
        if let Err(payload) = outcome {
            warn!(
                group = %self.name,
                task = %label,
                "Task failed: {}",
                panic_message(payload.as_ref())
            );
        }
        self.done(&label);
    }

    /// Registers one outstanding unit under `label`.
    ///
    /// Only needed for work not driven through [`spawn`](Self::spawn);
    /// every `add` must be paired with exactly one [`done`](Self::done).
    pub fn add(&self, label: &str) {
        let mut state = lock(&self.state);
        state.outstanding += 1;
        *state.in_flight.entry(label.to_string()).or_insert(0) += 1;
        debug!(group = %self.name, task = label, outstanding = state.outstanding, "Spawned");
    }

    /// Marks one unit under `label` as finished.
    ///
    /// Releases the waiter when the outstanding count reaches zero. A call
    /// with nothing outstanding is ignored, keeping the count non-negative.
    pub fn done(&self, label: &str) {
        let drained = {
            let mut state = lock(&self.state);
            if state.outstanding == 0 {
                warn!(group = %self.name, task = label, "done() called with no outstanding work");
                return;
            }
            state.outstanding -= 1;
            if let Some(count) = state.in_flight.get_mut(label) {
                *count -= 1;
                if *count == 0 {
                    state.in_flight.remove(label);
                }
            }
            debug!(group = %self.name, task = label, outstanding = state.outstanding, "Done");
            state.outstanding == 0
        };

        if drained {
            self.released.notify_waiters();
        }
    }

    /// Waits until every spawned unit is done.
    ///
    /// Returns immediately when nothing is outstanding.
    pub async fn wait(&self) {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before checking so a concurrent done() cannot slip in between.
            released.as_mut().enable();

            if lock(&self.state).outstanding == 0 {
                break;
            }
            released.await;
        }
        lock(&self.state).in_flight.clear();
    }

    /// Starts the advisory watcher.
    ///
    /// While the returned guard is alive a background task logs the labels
    /// still in flight, first after `schedule.initial` and then every
    /// `schedule.interval`. Dropping the guard stops it. The watcher only
    /// reports; it never cancels work.
    pub fn watch(&self, schedule: WatchSchedule) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let group = self.clone();

        tokio::spawn(async move {
            let mut delay = schedule.initial;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let pending = group.in_flight();
                if !pending.is_empty() {
                    info!(
                        group = %group.name,
                        "Waiting on {} task(s): {}",
                        pending.len(),
                        pending.join(", ")
                    );
                }
                delay = schedule.interval;
            }
        });

        token.drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_wait_without_work_returns() {
        let group = TaskGroup::new(true);
        group.wait().await;
        assert_eq!(group.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_sequential_runs_inline() {
        let group = TaskGroup::new(false);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order_task = order.clone();
            group
                .spawn(format!("t{}", i), async move {
                    tokio::task::yield_now().await;
                    lock(&order_task).push(i);
                })
                .await;
            // Sequential work is complete by the time spawn returns.
            assert_eq!(lock(&order).len(), i + 1);
        }

        assert_eq!(group.outstanding(), 0);
        group.wait().await;
        assert_eq!(*lock(&order), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_concurrent_wait_joins_all() {
        let group = TaskGroup::new(true);
        let finished = Arc::new(AtomicUsize::new(0));

        for i in 0..10u64 {
            let finished = finished.clone();
            group
                .spawn(format!("t{}", i), async move {
                    tokio::time::sleep(Duration::from_millis(10 - i)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        group.wait().await;
        assert_eq!(finished.load(Ordering::SeqCst), 10);
        assert!(group.in_flight().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_wait_joins_all_multi_thread() {
        let group = TaskGroup::new(true);
        let finished = Arc::new(AtomicUsize::new(0));

        for i in 0..100 {
            let finished = finished.clone();
            group
                .spawn(format!("t{}", i), async move {
                    tokio::task::yield_now().await;
                    finished.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        group.wait().await;
        assert_eq!(finished.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_counted_done() {
        for concurrent in [true, false] {
            let group = TaskGroup::new(concurrent);
            group
                .spawn("explodes", async {
                    panic!("kaboom");
                })
                .await;
            group.wait().await;
            assert_eq!(group.outstanding(), 0);
        }
    }

    #[test]
    fn test_wait_pending_until_last_done() {
        let group = TaskGroup::new(true);
        group.add("a");
        group.add("b");
        assert_eq!(group.in_flight(), vec!["a".to_string(), "b".to_string()]);

        let mut wait = tokio_test::task::spawn(group.wait());
        assert_pending!(wait.poll());

        group.done("a");
        assert_pending!(wait.poll());
        assert_eq!(group.in_flight(), vec!["b".to_string()]);

        group.done("b");
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_duplicate_labels_tracked() {
        let group = TaskGroup::new(false);
        group.add("same");
        group.add("same");
        group.done("same");
        assert_eq!(group.in_flight(), vec!["same".to_string()]);
        group.done("same");
        assert!(group.in_flight().is_empty());
    }

    #[test]
    fn test_done_without_work_is_ignored() {
        let group = TaskGroup::new(false);
        group.done("ghost");
        assert_eq!(group.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_group_reusable_after_wait() {
        let group = TaskGroup::new(true).with_name("reuse");
        assert_eq!(group.name(), "reuse");

        for round in 0..2 {
            let hits = Arc::new(AtomicUsize::new(0));
            for i in 0..3 {
                let hits = hits.clone();
                group
                    .spawn(format!("r{}-{}", round, i), async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                    })
                    .await;
            }
            group.wait().await;
            assert_eq!(hits.load(Ordering::SeqCst), 3);
        }
    }

    #[tokio::test]
    async fn test_watcher_stops_when_guard_dropped() {
        let group = TaskGroup::new(true);
        let schedule = WatchSchedule {
            initial: Duration::from_millis(1),
            interval: Duration::from_millis(1),
        };
        let guard = group.watch(schedule);
        group
            .spawn("slow", async {
                tokio::time::sleep(Duration::from_millis(5)).await;
            })
            .await;
        group.wait().await;
        drop(guard);
        assert_eq!(group.outstanding(), 0);
    }
}
