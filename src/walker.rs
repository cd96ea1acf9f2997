//! Recursive execution of a classified test tree.
//!
//! The [`TreeWalker`] visits every [`Node`]. Each level of the tree gets its
//! own [`TaskGroup`]: children are spawned first, a suite's own cases are
//! deferred behind them, and the level waits for everything before merging
//! the child results under their names.
//!
//! # Focus
//!
//! A suite with `_focus` raises a run-wide flag. Every branch still runs,
//! but once the flag is up the final tree keeps only focused branches, so
//! unfocused siblings contribute nothing to the counts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use crate::node::{Node, Suite, join_path};
use crate::report::Reporter;
use crate::result::{ResultNode, ResultTree, SuiteResult};
use crate::suite::SuiteRunner;
use crate::task_group::{TaskGroup, WatchSchedule, lock};

/// Case name used when the whole target is a single function.
pub const ROOT_CASE: &str = "root";

struct WalkState {
    suites: SuiteRunner,
    watch: WatchSchedule,
    reporter: Arc<dyn Reporter>,
    focus_requested: AtomicBool,
}

/// Walks a node tree and runs every suite in it.
///
/// A walker holds the state of one run; create a new one per run.
#[derive(Clone)]
pub struct TreeWalker {
    state: Arc<WalkState>,
}

impl TreeWalker {
    /// Creates a walker running suites through `suites`.
    pub fn new(suites: SuiteRunner, watch: WatchSchedule, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            state: Arc::new(WalkState {
                suites,
                watch,
                reporter,
                focus_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Whether any suite seen so far requested focus.
    pub fn focus_requested(&self) -> bool {
        self.state.focus_requested.load(Ordering::SeqCst)
    }

    /// Runs `root` and returns its focus-pruned results.
    ///
    /// `concurrent` is the ambient scheduling mode for suites that do not
    /// set `_async`.
    pub async fn run(&self, root: Node, concurrent: bool) -> ResultNode {
        let mut result = self
            .walk(String::new(), root, concurrent)
            .await
            .unwrap_or_else(|| ResultNode::Tree(ResultTree::default()));

        if self.focus_requested() {
            debug!("Focus requested, dropping unfocused branches");
            if !result.retain_focused(false) {
                result = ResultNode::Tree(ResultTree::default());
            }
        }
        result
    }

    /// Walks one node. Returns `None` for nodes that produce nothing.
    fn walk(
        &self,
        path: String,
        node: Node,
        concurrent: bool,
    ) -> BoxFuture<'static, Option<ResultNode>> {
        let walker = self.clone();
        async move {
            match node {
                Node::Invalid(err) => Some(ResultNode::Error(err.to_string())),
                Node::Case(case) => {
                    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
                    let name = if name.is_empty() { ROOT_CASE } else { name };
                    let suite = Arc::new(Suite::single(name, case));
                    let result = walker
                        .run_suite(parent.to_string(), suite, concurrent)
                        .await;
                    Some(ResultNode::Suite(result))
                }
                Node::Container(children) => {
                    let (entries, _) = walker.walk_level(&path, children, None, concurrent).await;
                    if entries.is_empty() {
                        None
                    } else {
                        Some(ResultNode::Tree(ResultTree { entries }))
                    }
                }
                Node::Suite { suite, children } => {
                    let concurrent = suite.config.async_mode.resolve(concurrent);
                    if suite.config.focus {
                        walker.state.focus_requested.store(true, Ordering::SeqCst);
                    }

                    let suite = Arc::new(suite);
                    if children.is_empty() {
                        let result = walker.run_suite(path, suite, concurrent).await;
                        return Some(ResultNode::Suite(result));
                    }

                    let (entries, own) = walker
                        .walk_level(&path, children, Some(suite.clone()), concurrent)
                        .await;
                    let mut result = own.unwrap_or_else(|| SuiteResult::new(suite.config.focus));
                    result.children.extend(entries);
                    Some(ResultNode::Suite(result))
                }
            }
        }
        .boxed()
    }

    /// Runs the children of one level, plus the level's own suite if any.
    ///
    /// The suite is deferred until every child has been spawned, so sibling
    /// discovery is never blocked behind it.
    async fn walk_level(
        &self,
        path: &str,
        children: BTreeMap<String, Node>,
        own: Option<Arc<Suite>>,
        concurrent: bool,
    ) -> (BTreeMap<String, ResultNode>, Option<SuiteResult>) {
        let label = if path.is_empty() { "<root>" } else { path };
        let group = TaskGroup::new(concurrent).with_name(label);
        let _watch = group.watch(self.state.watch);
        let entries = Arc::new(Mutex::new(BTreeMap::new()));
        let own_result = Arc::new(Mutex::new(None));

        for (name, child) in children {
            let walk = self.walk(join_path(path, &name), child, concurrent);
            let entries = entries.clone();
            group
                .spawn(name.clone(), async move {
                    if let Some(result) = walk.await {
                        lock(&entries).insert(name, result);
                    }
                })
                .await;
        }

        if let Some(suite) = own {
            let walker = self.clone();
            let slot = own_result.clone();
            let suite_path = path.to_string();
            group
                .spawn(format!("{} (cases)", path), async move {
                    let result = walker.run_suite(suite_path, suite, concurrent).await;
                    *lock(&slot) = Some(result);
                })
                .await;
        }

        group.wait().await;

        let entries = std::mem::take(&mut *lock(&entries));
        let own = lock(&own_result).take();
        (entries, own)
    }

    async fn run_suite(&self, path: String, suite: Arc<Suite>, concurrent: bool) -> SuiteResult {
        let result = self.state.suites.run(&path, &suite, concurrent).await;
        self.state.reporter.on_suite_complete(&path, &result).await;
        result
    }
}
