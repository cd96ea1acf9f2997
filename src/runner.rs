//! Run entry point.
//!
//! A [`Runner`] takes a target (an in-memory [`Value`] tree or a
//! [`HostNode`] tree of test modules), classifies it, walks it, counts the
//! outcomes and hands the finished [`RunReport`] to its reporter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AfterEachPolicy, EngineConfig};
use crate::node::{HostNode, MODULE_SUFFIX, Node};
use crate::report::{ConsoleReporter, JUnitReporter, MultiReporter, NullReporter, Reporter};
use crate::result::{Counts, ResultNode, ResultTree, count};
use crate::suite::SuiteRunner;
use crate::task_group::WatchSchedule;
use crate::value::{Bindings, Value};
use crate::walker::TreeWalker;

/// What a run executes.
pub enum Target {
    /// An in-memory tree of maps and functions.
    Value(Value),
    /// A host-provided tree of folders and test modules.
    Host(Arc<dyn HostNode>),
}

impl From<Value> for Target {
    fn from(value: Value) -> Self {
        Target::Value(value)
    }
}

impl From<Arc<dyn HostNode>> for Target {
    fn from(host: Arc<dyn HostNode>) -> Self {
        Target::Host(host)
    }
}

/// Options for one run.
///
/// # Example
///
/// ```
/// use arbor::RunOptions;
///
/// let options = RunOptions {
///     concurrent: false,
///     silent: true,
///     ..RunOptions::default()
/// };
/// assert!(options.bindings.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Values injected into every case context.
    pub bindings: Bindings,

    /// Scheduling mode for suites that don't set `_async`.
    pub concurrent: bool,

    /// Suppress the console report.
    pub silent: bool,

    /// Announce every suite on the console as it finishes.
    pub verbose: bool,

    /// What an `afterEach` failure does to its case.
    pub after_each: AfterEachPolicy,

    /// Name suffix marking test modules in host trees.
    pub module_suffix: String,

    /// Advisory watcher timing.
    pub watch: WatchSchedule,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            bindings: Bindings::new(),
            concurrent: true,
            silent: false,
            verbose: false,
            after_each: AfterEachPolicy::default(),
            module_suffix: MODULE_SUFFIX.to_string(),
            watch: WatchSchedule::default(),
        }
    }
}

impl From<&EngineConfig> for RunOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            bindings: config.bindings.clone(),
            concurrent: config.run.concurrent,
            silent: config.run.silent,
            verbose: config.report.verbose,
            after_each: config.run.after_each_policy,
            module_suffix: config.run.module_suffix.clone(),
            watch: config.run.watch_schedule(),
        }
    }
}

/// The outcome of a whole run.
///
/// Serializes with the counts merged in at the top level:
///
/// ```json
/// { "root": { ... }, "PASSED": 3, "FAILED": 1, "SKIPPED": 0, "duration": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// The focus-pruned result tree.
    pub root: ResultNode,

    #[serde(flatten)]
    pub counts: Counts,

    /// Wall-clock time of the run.
    pub duration: Duration,
}

impl RunReport {
    /// Builds a report and counts `root`.
    pub fn new(root: ResultNode, duration: Duration) -> Self {
        let counts = count(&root);
        Self {
            root,
            counts,
            duration,
        }
    }

    /// Returns `true` when nothing failed.
    pub fn success(&self) -> bool {
        self.counts.success()
    }

    pub fn passed(&self) -> usize {
        self.counts.passed
    }

    pub fn failed(&self) -> usize {
        self.counts.failed
    }

    pub fn skipped(&self) -> usize {
        self.counts.skipped
    }

    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs test targets.
pub struct Runner {
    options: RunOptions,
    reporter: Arc<dyn Reporter>,
}

impl Runner {
    /// Creates a runner reporting to the console unless `silent` is set.
    pub fn new(options: RunOptions) -> Self {
        let reporter: Arc<dyn Reporter> = if options.silent {
            Arc::new(NullReporter)
        } else {
            Arc::new(ConsoleReporter::new(options.verbose))
        };
        Self { options, reporter }
    }

    /// Creates a runner from a loaded config, adding a JUnit reporter when
    /// `report.junit` is set.
    pub fn from_config(config: &EngineConfig) -> Self {
        let options = RunOptions::from(config);

        let mut reporters = MultiReporter::new();
        if !options.silent {
            reporters = reporters.with_reporter(ConsoleReporter::new(options.verbose));
        }
        if let Some(path) = &config.report.junit {
            reporters = reporters.with_reporter(
                JUnitReporter::new(path.clone())
                    .with_testsuites_name(config.report.testsuites_name.clone()),
            );
        }

        let reporter: Arc<dyn Reporter> = if reporters.is_empty() {
            Arc::new(NullReporter)
        } else {
            Arc::new(reporters)
        };
        Self { options, reporter }
    }

    /// Replaces the reporter.
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs `target` to completion.
    ///
    /// A value target that is neither a map nor a function runs nothing and
    /// reports a single skip.
    pub async fn run(&self, target: impl Into<Target>) -> RunReport {
        let start = Instant::now();

        let node = match target.into() {
            Target::Value(value @ (Value::Map(_) | Value::Func(_))) => Node::from_value(&value),
            Target::Value(other) => {
                warn!("Unrecognized test target ({}), nothing to run", other.kind());
                return self.finish(ResultNode::Skipped, start).await;
            }
            Target::Host(host) => Node::from_host(host.as_ref(), &self.options.module_suffix),
        };

        let root = match node {
            Some(node) => {
                let suites = SuiteRunner::new(Arc::new(self.options.bindings.clone()))
                    .with_policy(self.options.after_each)
                    .with_watch(self.options.watch);
                let walker = TreeWalker::new(suites, self.options.watch, self.reporter.clone());
                walker.run(node, self.options.concurrent).await
            }
            None => ResultNode::Tree(ResultTree::default()),
        };

        self.finish(root, start).await
    }

    async fn finish(&self, root: ResultNode, start: Instant) -> RunReport {
        let report = RunReport::new(root, start.elapsed());
        info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            duration_ms = report.duration.as_millis() as u64,
            "Run complete"
        );
        self.reporter.on_run_complete(&report).await;
        report
    }
}

/// Runs `target` with `options` and returns the report.
///
/// Shorthand for `Runner::new(options).run(target)`.
pub async fn run(target: impl Into<Target>, options: RunOptions) -> RunReport {
    Runner::new(options).run(target).await
}
