//! Running all cases of one suite.
//!
//! The [`SuiteRunner`] spawns every case of a suite through its own
//! [`TaskGroup`], waits for all of them, and then runs the suite's `after`
//! hook. Cases write into a shared [`SuiteResult`] keyed by case name, so
//! completion order does not matter.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info};

use crate::case::{CaseRecord, CaseRunner, settle};
use crate::config::AfterEachPolicy;
use crate::node::{HookKind, Suite, SuiteEntry, join_path};
use crate::result::{CaseResult, ResultNode, SuiteResult};
use crate::task_group::{TaskGroup, WatchSchedule, lock};
use crate::value::{Bindings, CaseContext};

/// Runs suites with a shared set of bindings and policies.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use arbor::{Bindings, Node, Outcome, Value};
/// use arbor::suite::SuiteRunner;
///
/// # tokio_test::block_on(async {
/// let value = Value::map([
///     ("a", Value::func(|_| Ok(Outcome::Done))),
///     ("b", Value::func(|_| Ok(Outcome::Skip))),
/// ]);
/// let Some(Node::Suite { suite, .. }) = Node::from_value(&value) else { unreachable!() };
///
/// let runner = SuiteRunner::new(Arc::new(Bindings::new()));
/// let result = runner.run("demo", &suite, false).await;
/// assert!(result.cases["a"].is_passed());
/// assert!(result.cases["b"].is_skipped());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct SuiteRunner {
    bindings: Arc<Bindings>,
    policy: AfterEachPolicy,
    watch: WatchSchedule,
}

impl SuiteRunner {
    /// Creates a runner injecting `bindings` into every case.
    pub fn new(bindings: Arc<Bindings>) -> Self {
        Self {
            bindings,
            policy: AfterEachPolicy::default(),
            watch: WatchSchedule::default(),
        }
    }

    /// Sets how `afterEach` failures treat the case result.
    pub fn with_policy(mut self, policy: AfterEachPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the advisory watcher schedule.
    pub fn with_watch(mut self, watch: WatchSchedule) -> Self {
        self.watch = watch;
        self
    }

    /// Runs every case of `suite` and returns its results.
    ///
    /// `path` names the suite in case contexts and diagnostics; `concurrent`
    /// is the already-resolved scheduling mode. A skipped suite marks every
    /// case skipped without running any case or hook.
    pub async fn run(&self, path: &str, suite: &Suite, concurrent: bool) -> SuiteResult {
        let start = Instant::now();
        let collected = Arc::new(Mutex::new(SuiteResult::new(suite.config.focus)));

        if suite.config.skip {
            debug!(suite = path, "Suite skipped");
            let mut result = lock(&collected);
            for (name, entry) in &suite.entries {
                match entry {
                    SuiteEntry::Case(_) => {
                        result.cases.insert(name.clone(), CaseResult::Skipped);
                    }
                    SuiteEntry::Invalid(err) => {
                        result
                            .children
                            .insert(name.clone(), ResultNode::Error(err.to_string()));
                    }
                }
            }
        } else {
            let group = TaskGroup::new(concurrent).with_name(path);
            let _watch = group.watch(self.watch);
            let runner = Arc::new(CaseRunner::new(suite.config.clone(), self.policy));

            for (name, entry) in &suite.entries {
                let case = match entry {
                    SuiteEntry::Case(case) => case.clone(),
                    SuiteEntry::Invalid(err) => {
                        lock(&collected)
                            .children
                            .insert(name.clone(), ResultNode::Error(err.to_string()));
                        continue;
                    }
                };

                let ctx = CaseContext::new(join_path(path, name), self.bindings.clone());
                let runner = runner.clone();
                let collected = collected.clone();
                let case_name = name.clone();
                group
                    .spawn(name.clone(), async move {
                        let record = runner.run(&case, &ctx).await;
                        record_case(&collected, case_name, record);
                    })
                    .await;
            }

            group.wait().await;
        }

        let mut result = std::mem::take(&mut *lock(&collected));
        result.focus = suite.config.focus;
        result.duration = start.elapsed();

        if !suite.config.skip
            && let Some(after) = suite.config.hook(HookKind::After)
        {
            let ctx = CaseContext::new(
                join_path(path, HookKind::After.key()),
                self.bindings.clone(),
            );
            if let Err(reason) = settle(after, &ctx).await {
                result.hooks.insert(HookKind::After, reason);
            }
        }

        info!(
            suite = path,
            cases = result.cases.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Suite finished"
        );
        result
    }
}

fn record_case(collected: &Mutex<SuiteResult>, name: String, record: CaseRecord) {
    let mut result = lock(collected);
    if let Some((hook, reason)) = record.hook_failure {
        result.hooks.insert(hook, reason);
    }
    if let Some(case) = record.result {
        result.cases.insert(name, case);
    }
}
