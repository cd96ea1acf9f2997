//! Test reporting and output generation.
//!
//! This module renders result trees as text and defines the [`Reporter`]
//! trait that receives events while a run progresses.
//!
//! # Text format
//!
//! [`format`] renders a tree with two spaces of indentation per level and
//! entries sorted by name:
//!
//! ```text
//! math (12ms)
//!   ✓ adds (0ms)
//!   ✗ divides (1ms)
//!     expected 2, got 3
//!   - later (skipped)
//! ```

pub mod junit;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::result::{CaseResult, Counts, ResultNode, SuiteResult};
use crate::runner::RunReport;

pub use junit::JUnitReporter;

const PASS: &str = "✓";
const FAIL: &str = "✗";
const SKIP: &str = "-";

/// A test reporter receives events during a run.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called when a suite's cases and `after` hook have finished.
    async fn on_suite_complete(&self, path: &str, result: &SuiteResult);

    /// Called when the whole run has completed.
    async fn on_run_complete(&self, report: &RunReport);
}

/// A reporter that does nothing (for silent runs or tests).
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_suite_complete(&self, _path: &str, _result: &SuiteResult) {}
    async fn on_run_complete(&self, _report: &RunReport) {}
}

/// A reporter that combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    /// Create a new multi-reporter.
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    /// Add a reporter to the multi-reporter.
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    /// Number of reporters registered.
    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    /// Returns true if no reporters are registered.
    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Default for MultiReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for MultiReporter {
    async fn on_suite_complete(&self, path: &str, result: &SuiteResult) {
        for reporter in &self.reporters {
            reporter.on_suite_complete(path, result).await;
        }
    }

    async fn on_run_complete(&self, report: &RunReport) {
        for reporter in &self.reporters {
            reporter.on_run_complete(report).await;
        }
    }
}

/// Console reporter that prints the result tree and a summary.
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    /// Create a new console reporter.
    ///
    /// When `verbose` is set, every finished suite is announced as it
    /// completes.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_suite_complete(&self, path: &str, result: &SuiteResult) {
        if self.verbose {
            println!(
                "{} {} ({})",
                console::style("Finished").dim(),
                path,
                millis(result.duration)
            );
        }
    }

    async fn on_run_complete(&self, report: &RunReport) {
        let counts = report.counts;

        print!("{}", format(&report.root, 0));
        println!();
        println!(
            "{} in {}",
            console::style(summary(&counts)).bold(),
            millis(report.duration)
        );

        if counts.failed > 0 {
            warn!("{} test(s) failed", counts.failed);
            println!("{}", console::style("Some tests failed.").red().bold());
        } else {
            info!("All tests passed");
            println!("{}", console::style("All tests passed!").green().bold());
        }
    }
}

/// Renders a result node as indented text, starting at `depth`.
///
/// Entries are sorted by name, so the output is deterministic regardless
/// of completion order. Durations are rounded to whole milliseconds.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use arbor::{CaseResult, ResultNode, SuiteResult};
/// use arbor::report::format;
///
/// let mut suite = SuiteResult::new(false);
/// suite.cases.insert("b".into(), CaseResult::Skipped);
/// suite.cases.insert("a".into(), CaseResult::Passed { duration: Duration::from_micros(2600) });
///
/// assert_eq!(format(&ResultNode::Suite(suite), 0), "✓ a (3ms)\n- b (skipped)\n");
/// ```
pub fn format(node: &ResultNode, depth: usize) -> String {
    let mut out = String::new();
    write_node(&mut out, node, depth);
    out
}

/// One-line summary of the counts.
pub fn summary(counts: &Counts) -> String {
    format!(
        "{} passed, {} failed, {} skipped",
        counts.passed, counts.failed, counts.skipped
    )
}

fn millis(duration: Duration) -> String {
    format!("{}ms", (duration.as_secs_f64() * 1000.0).round() as u64)
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(text);
    out.push('\n');
}

fn reason_lines(out: &mut String, depth: usize, reason: &str) {
    for text in reason.lines() {
        line(out, depth, text);
    }
}

fn write_node(out: &mut String, node: &ResultNode, depth: usize) {
    match node {
        ResultNode::Suite(suite) => write_suite(out, suite, depth),
        ResultNode::Tree(tree) => {
            for (name, child) in &tree.entries {
                write_entry(out, name, child, depth);
            }
        }
        ResultNode::Error(message) => {
            line(out, depth, FAIL);
            reason_lines(out, depth + 1, message);
        }
        ResultNode::Skipped => line(out, depth, &format!("{} (skipped)", SKIP)),
    }
}

fn write_entry(out: &mut String, name: &str, node: &ResultNode, depth: usize) {
    match node {
        ResultNode::Suite(suite) => {
            line(out, depth, &format!("{} ({})", name, millis(suite.duration)));
            write_suite(out, suite, depth + 1);
        }
        ResultNode::Tree(_) => {
            line(out, depth, name);
            write_node(out, node, depth + 1);
        }
        ResultNode::Error(message) => {
            line(out, depth, &format!("{} {}", FAIL, name));
            reason_lines(out, depth + 1, message);
        }
        ResultNode::Skipped => line(out, depth, &format!("{} {} (skipped)", SKIP, name)),
    }
}

enum Row<'a> {
    Case(&'a CaseResult),
    Hook(&'a str),
    Child(&'a ResultNode),
}

fn write_suite(out: &mut String, suite: &SuiteResult, depth: usize) {
    let mut rows: Vec<(&str, Row<'_>)> = suite
        .cases
        .iter()
        .map(|(name, case)| (name.as_str(), Row::Case(case)))
        .chain(
            suite
                .hooks
                .iter()
                .map(|(hook, reason)| (hook.key(), Row::Hook(reason.as_str()))),
        )
        .chain(
            suite
                .children
                .iter()
                .map(|(name, child)| (name.as_str(), Row::Child(child))),
        )
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    for (name, row) in rows {
        match row {
            Row::Case(CaseResult::Passed { duration }) => {
                line(out, depth, &format!("{} {} ({})", PASS, name, millis(*duration)));
            }
            Row::Case(CaseResult::Failed { reason, duration }) => {
                line(out, depth, &format!("{} {} ({})", FAIL, name, millis(*duration)));
                reason_lines(out, depth + 1, reason);
            }
            Row::Case(CaseResult::Skipped) => {
                line(out, depth, &format!("{} {} (skipped)", SKIP, name));
            }
            Row::Hook(reason) => {
                line(out, depth, &format!("{} {}", FAIL, name));
                reason_lines(out, depth + 1, reason);
            }
            Row::Child(child) => write_entry(out, name, child, depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::HookKind;
    use crate::result::ResultTree;

    fn sample() -> ResultNode {
        let mut math = SuiteResult::new(false);
        math.duration = Duration::from_millis(12);
        math.cases.insert(
            "divides".to_string(),
            CaseResult::Failed {
                reason: "expected 2\ngot 3".to_string(),
                duration: Duration::from_millis(1),
            },
        );
        math.cases.insert(
            "adds".to_string(),
            CaseResult::Passed {
                duration: Duration::from_micros(400),
            },
        );
        math.cases.insert("later".to_string(), CaseResult::Skipped);
        math.hooks
            .insert(HookKind::AfterEach, "cleanup failed".to_string());

        let mut entries = std::collections::BTreeMap::new();
        entries.insert("math".to_string(), ResultNode::Suite(math));
        entries.insert(
            "broken".to_string(),
            ResultNode::Error("beforeEach must be a function, got string".to_string()),
        );
        ResultNode::Tree(ResultTree { entries })
    }

    #[test]
    fn test_format_sorted_and_indented() {
        let expected = "\
✗ broken
  beforeEach must be a function, got string
math (12ms)
  ✓ adds (0ms)
  ✗ afterEach
    cleanup failed
  ✗ divides (1ms)
    expected 2
    got 3
  - later (skipped)
";
        assert_eq!(format(&sample(), 0), expected);
    }

    #[test]
    fn test_format_depth_offset() {
        let text = format(&sample(), 2);
        assert!(text.starts_with("    ✗ broken\n"));
    }

    #[test]
    fn test_format_nested_tree() {
        let mut inner = std::collections::BTreeMap::new();
        inner.insert("gone".to_string(), ResultNode::Skipped);
        let mut outer = std::collections::BTreeMap::new();
        outer.insert(
            "folder".to_string(),
            ResultNode::Tree(ResultTree { entries: inner }),
        );
        let text = format(&ResultNode::Tree(ResultTree { entries: outer }), 0);
        assert_eq!(text, "folder\n  - gone (skipped)\n");
    }

    #[test]
    fn test_summary() {
        let counts = Counts {
            passed: 3,
            failed: 1,
            skipped: 2,
        };
        assert_eq!(summary(&counts), "3 passed, 1 failed, 2 skipped");
    }

    #[tokio::test]
    async fn test_multi_reporter_fans_out() {
        let multi = MultiReporter::new()
            .with_reporter(NullReporter)
            .with_reporter(ConsoleReporter::new(true));
        assert_eq!(multi.len(), 2);
        assert!(!multi.is_empty());
        assert!(MultiReporter::default().is_empty());

        multi.on_suite_complete("math", &SuiteResult::new(false)).await;
    }

    #[test]
    fn test_millis_rounding() {
        assert_eq!(millis(Duration::from_micros(1499)), "1ms");
        assert_eq!(millis(Duration::from_micros(1500)), "2ms");
    }
}
