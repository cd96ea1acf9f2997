//! Result tree types and outcome counting.
//!
//! A run produces a [`ResultNode`]: suites map case names to
//! [`CaseResult`]s, containers map child names to further nodes, and
//! malformed input shows up as an error string.
//!
//! ```text
//! ResultNode::Tree
//! ├── "math" ─► ResultNode::Suite
//! │             ├── cases:    adds ─► Passed, divides ─► Failed("...")
//! │             ├── hooks:    afterEach ─► "reason"
//! │             └── children: "nested" ─► ResultNode::Suite
//! └── "broken" ─► ResultNode::Error("beforeEach must be a function, got string")
//! ```

use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::time::Duration;

use serde::Serialize;

use crate::node::HookKind;

/// Outcome of a single case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CaseResult {
    /// The case completed (or its future resolved).
    Passed { duration: Duration },

    /// The case returned an error, panicked, or its future was rejected.
    Failed { reason: String, duration: Duration },

    /// The case asked to be skipped, or its suite was skipped.
    Skipped,
}

impl CaseResult {
    /// Returns `true` for [`CaseResult::Passed`].
    pub fn is_passed(&self) -> bool {
        matches!(self, CaseResult::Passed { .. })
    }

    /// Returns `true` for [`CaseResult::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, CaseResult::Failed { .. })
    }

    /// Returns `true` for [`CaseResult::Skipped`].
    pub fn is_skipped(&self) -> bool {
        matches!(self, CaseResult::Skipped)
    }

    /// Time the case took. Skipped cases have none.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            CaseResult::Passed { duration } | CaseResult::Failed { duration, .. } => {
                Some(*duration)
            }
            CaseResult::Skipped => None,
        }
    }

    /// Failure reason, for failed cases.
    pub fn reason(&self) -> Option<&str> {
        match self {
            CaseResult::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Results of one suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteResult {
    /// Case name -> result.
    pub cases: BTreeMap<String, CaseResult>,

    /// Hook failures, keyed apart from cases.
    pub hooks: BTreeMap<HookKind, String>,

    /// Nested nodes and per-key structural errors.
    pub children: BTreeMap<String, ResultNode>,

    /// Wall-clock time of the whole suite.
    pub duration: Duration,

    /// Whether the suite requested focus.
    pub focus: bool,
}

impl SuiteResult {
    /// Creates an empty result.
    pub fn new(focus: bool) -> Self {
        Self {
            focus,
            ..Self::default()
        }
    }
}

/// Named children of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultTree {
    pub entries: BTreeMap<String, ResultNode>,
}

impl ResultTree {
    /// Returns the child named `name`.
    pub fn get(&self, name: &str) -> Option<&ResultNode> {
        self.entries.get(name)
    }

    /// Returns `true` when the tree has no children.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A node of the result tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultNode {
    Suite(SuiteResult),
    Tree(ResultTree),
    /// A malformed node; counts as one failure.
    Error(String),
    /// Nothing ran; counts as one skip.
    Skipped,
}

impl ResultNode {
    /// Returns the suite result, if this node is a suite.
    pub fn as_suite(&self) -> Option<&SuiteResult> {
        match self {
            ResultNode::Suite(suite) => Some(suite),
            _ => None,
        }
    }

    /// Returns the tree, if this node is a container.
    pub fn as_tree(&self) -> Option<&ResultTree> {
        match self {
            ResultNode::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Follows a slash-separated path through trees and suite children.
    pub fn find(&self, path: &str) -> Option<&ResultNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| match node {
                ResultNode::Tree(tree) => tree.entries.get(segment),
                ResultNode::Suite(suite) => suite.children.get(segment),
                _ => None,
            })
    }

    /// Drops every branch outside of focus.
    ///
    /// A branch stays when it, an ancestor (`inherited`) or a descendant
    /// requested focus. An unfocused suite that stays only as the path to a
    /// focused descendant loses its own cases and hooks. Returns `false`
    /// when nothing is left of this node.
    pub fn retain_focused(&mut self, inherited: bool) -> bool {
        match self {
            ResultNode::Suite(suite) => {
                let in_focus = inherited || suite.focus;
                suite
                    .children
                    .retain(|_, child| child.retain_focused(in_focus));
                if in_focus {
                    true
                } else {
                    suite.cases.clear();
                    suite.hooks.clear();
                    !suite.children.is_empty()
                }
            }
            ResultNode::Tree(tree) => {
                tree.entries
                    .retain(|_, child| child.retain_focused(inherited));
                !tree.entries.is_empty()
            }
            ResultNode::Error(_) | ResultNode::Skipped => inherited,
        }
    }
}

/// Pass/fail/skip totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct Counts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Counts {
    /// Total number of counted entries.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Returns `true` when nothing failed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, other: Counts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Counts outcomes in a result tree.
///
/// Each case adds one to its bucket, each hook failure and each error
/// string adds one failure, and a bare skip adds one skip.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use arbor::{CaseResult, ResultNode, SuiteResult, count};
///
/// let mut suite = SuiteResult::new(false);
/// suite.cases.insert("a".into(), CaseResult::Passed { duration: Duration::ZERO });
/// suite.cases.insert("b".into(), CaseResult::Skipped);
///
/// let counts = count(&ResultNode::Suite(suite));
/// assert_eq!((counts.passed, counts.failed, counts.skipped), (1, 0, 1));
/// ```
pub fn count(node: &ResultNode) -> Counts {
    let mut counts = Counts::default();
    match node {
        ResultNode::Suite(suite) => {
            for result in suite.cases.values() {
                match result {
                    CaseResult::Passed { .. } => counts.passed += 1,
                    CaseResult::Failed { .. } => counts.failed += 1,
                    CaseResult::Skipped => counts.skipped += 1,
                }
            }
            counts.failed += suite.hooks.len();
            for child in suite.children.values() {
                counts += count(child);
            }
        }
        ResultNode::Tree(tree) => {
            for child in tree.entries.values() {
                counts += count(child);
            }
        }
        ResultNode::Error(_) => counts.failed += 1,
        ResultNode::Skipped => counts.skipped += 1,
    }
    counts
}
