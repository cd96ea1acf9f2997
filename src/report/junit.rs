//! JUnit XML report generation.
//!
//! Every suite in the result tree becomes one `<testsuite>` named by its
//! slash-joined path. Hook failures are written as failing test cases named
//! after the hook, and structural errors as `<error>` elements.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <testsuites name="arbor" tests="3" failures="1" errors="0" skipped="1" time="0.012">
//!   <testsuite name="math" tests="3" failures="1" errors="0" skipped="1" time="0.012">
//!     <testcase classname="math" name="adds" time="0.001"/>
//!     <testcase classname="math" name="divides" time="0.002">
//!       <failure message="expected 2, got 3" type="CaseFailure">expected 2, got 3</failure>
//!     </testcase>
//!     <testcase classname="math" name="later">
//!       <skipped/>
//!     </testcase>
//!   </testsuite>
//! </testsuites>
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::Reporter;
use crate::node::join_path;
use crate::result::{CaseResult, ResultNode, SuiteResult};
use crate::runner::RunReport;

/// Name given to the suite at the root of the tree.
const ROOT_SUITE: &str = "root";

/// Reporter that writes a JUnit XML file when the run completes.
///
/// Parent directories are created if they don't exist.
///
/// # Example
///
/// ```
/// use arbor::report::JUnitReporter;
///
/// let reporter = JUnitReporter::new("target/junit.xml".into())
///     .with_testsuites_name("my-project");
/// ```
pub struct JUnitReporter {
    output_path: PathBuf,
    testsuites_name: String,
}

enum Status<'a> {
    Passed,
    Failed(&'a str),
    Error(&'a str),
    Skipped,
}

struct FlatCase<'a> {
    name: String,
    time: Option<Duration>,
    status: Status<'a>,
}

struct FlatSuite<'a> {
    name: String,
    time: Duration,
    cases: Vec<FlatCase<'a>>,
}

impl FlatSuite<'_> {
    fn count(&self, pred: impl Fn(&Status<'_>) -> bool) -> usize {
        self.cases.iter().filter(|c| pred(&c.status)).count()
    }
}

impl JUnitReporter {
    /// Creates a reporter writing to `output_path`.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            testsuites_name: "arbor".to_string(),
        }
    }

    /// Sets the name of the top-level `<testsuites>` element.
    pub fn with_testsuites_name(mut self, name: impl Into<String>) -> Self {
        self.testsuites_name = name.into();
        self
    }

    /// Generates the XML document for a finished run.
    pub fn generate_xml(&self, report: &RunReport) -> anyhow::Result<String> {
        let mut suites = Vec::new();
        flatten("", &report.root, &mut suites);

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let tests: usize = suites.iter().map(|s| s.cases.len()).sum();
        let failures: usize = suites
            .iter()
            .map(|s| s.count(|st| matches!(st, Status::Failed(_))))
            .sum();
        let errors: usize = suites
            .iter()
            .map(|s| s.count(|st| matches!(st, Status::Error(_))))
            .sum();
        let skipped: usize = suites
            .iter()
            .map(|s| s.count(|st| matches!(st, Status::Skipped)))
            .sum();

        let mut testsuites = BytesStart::new("testsuites");
        testsuites.push_attribute(("name", self.testsuites_name.as_str()));
        testsuites.push_attribute(("tests", tests.to_string().as_str()));
        testsuites.push_attribute(("failures", failures.to_string().as_str()));
        testsuites.push_attribute(("errors", errors.to_string().as_str()));
        testsuites.push_attribute(("skipped", skipped.to_string().as_str()));
        testsuites.push_attribute(("time", seconds(report.duration).as_str()));
        writer.write_event(Event::Start(testsuites))?;

        for suite in &suites {
            write_testsuite(&mut writer, suite)?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

        let xml = String::from_utf8(writer.into_inner())?;
        Ok(xml)
    }

    /// Generates the report and writes it to the output path.
    pub fn write(&self, report: &RunReport) -> anyhow::Result<()> {
        let xml = self.generate_xml(report)?;
        if let Some(parent) = self.output_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory {}", parent.display())
            })?;
        }
        std::fs::write(&self.output_path, xml)
            .with_context(|| format!("Failed to write {}", self.output_path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl Reporter for JUnitReporter {
    async fn on_suite_complete(&self, _path: &str, _result: &SuiteResult) {}

    async fn on_run_complete(&self, report: &RunReport) {
        match self.write(report) {
            Ok(()) => tracing::info!("JUnit XML written to: {}", self.output_path.display()),
            Err(e) => tracing::error!("Failed to write JUnit XML: {:#}", e),
        }
    }
}

fn flatten<'a>(path: &str, node: &'a ResultNode, out: &mut Vec<FlatSuite<'a>>) {
    match node {
        ResultNode::Suite(suite) => {
            let mut cases = Vec::new();
            for (name, case) in &suite.cases {
                let (time, status) = match case {
                    CaseResult::Passed { duration } => (Some(*duration), Status::Passed),
                    CaseResult::Failed { reason, duration } => {
                        (Some(*duration), Status::Failed(reason.as_str()))
                    }
                    CaseResult::Skipped => (None, Status::Skipped),
                };
                cases.push(FlatCase {
                    name: name.clone(),
                    time,
                    status,
                });
            }
            for (hook, reason) in &suite.hooks {
                cases.push(FlatCase {
                    name: hook.key().to_string(),
                    time: None,
                    status: Status::Failed(reason.as_str()),
                });
            }

            let mut nested = Vec::new();
            for (name, child) in &suite.children {
                match child {
                    ResultNode::Error(message) => cases.push(FlatCase {
                        name: name.clone(),
                        time: None,
                        status: Status::Error(message.as_str()),
                    }),
                    other => nested.push((join_path(path, name), other)),
                }
            }

            out.push(FlatSuite {
                name: suite_name(path).to_string(),
                time: suite.duration,
                cases,
            });
            for (child_path, child) in nested {
                flatten(&child_path, child, out);
            }
        }
        ResultNode::Tree(tree) => {
            for (name, child) in &tree.entries {
                flatten(&join_path(path, name), child, out);
            }
        }
        ResultNode::Error(message) => {
            let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
            out.push(FlatSuite {
                name: suite_name(parent).to_string(),
                time: Duration::ZERO,
                cases: vec![FlatCase {
                    name: if name.is_empty() { ROOT_SUITE } else { name }.to_string(),
                    time: None,
                    status: Status::Error(message.as_str()),
                }],
            });
        }
        ResultNode::Skipped => {}
    }
}

fn write_testsuite<W: std::io::Write>(
    writer: &mut Writer<W>,
    suite: &FlatSuite<'_>,
) -> anyhow::Result<()> {
    let mut testsuite = BytesStart::new("testsuite");
    testsuite.push_attribute(("name", suite.name.as_str()));
    testsuite.push_attribute(("tests", suite.cases.len().to_string().as_str()));
    testsuite.push_attribute((
        "failures",
        suite
            .count(|s| matches!(s, Status::Failed(_)))
            .to_string()
            .as_str(),
    ));
    testsuite.push_attribute((
        "errors",
        suite
            .count(|s| matches!(s, Status::Error(_)))
            .to_string()
            .as_str(),
    ));
    testsuite.push_attribute((
        "skipped",
        suite
            .count(|s| matches!(s, Status::Skipped))
            .to_string()
            .as_str(),
    ));
    testsuite.push_attribute(("time", seconds(suite.time).as_str()));
    writer.write_event(Event::Start(testsuite))?;

    let classname = suite.name.replace('/', ".");
    for case in &suite.cases {
        let mut testcase = BytesStart::new("testcase");
        testcase.push_attribute(("classname", classname.as_str()));
        testcase.push_attribute(("name", case.name.as_str()));
        if let Some(time) = case.time {
            testcase.push_attribute(("time", seconds(time).as_str()));
        }

        match case.status {
            Status::Passed => {
                writer.write_event(Event::Empty(testcase))?;
            }
            Status::Failed(reason) => {
                writer.write_event(Event::Start(testcase))?;
                write_problem(writer, "failure", "CaseFailure", reason)?;
                writer.write_event(Event::End(BytesEnd::new("testcase")))?;
            }
            Status::Error(message) => {
                writer.write_event(Event::Start(testcase))?;
                write_problem(writer, "error", "StructureError", message)?;
                writer.write_event(Event::End(BytesEnd::new("testcase")))?;
            }
            Status::Skipped => {
                writer.write_event(Event::Start(testcase))?;
                writer.write_event(Event::Empty(BytesStart::new("skipped")))?;
                writer.write_event(Event::End(BytesEnd::new("testcase")))?;
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_problem<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    kind: &str,
    text: &str,
) -> anyhow::Result<()> {
    let text = strip_invalid_chars(text);
    let first_line = text.lines().next().unwrap_or_default();

    let mut element = BytesStart::new(tag);
    element.push_attribute(("message", first_line));
    element.push_attribute(("type", kind));
    writer.write_event(Event::Start(element))?;
    writer.write_event(Event::Text(BytesText::new(&text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn suite_name(path: &str) -> &str {
    if path.is_empty() { ROOT_SUITE } else { path }
}

fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// Removes characters XML 1.0 cannot represent.
fn strip_invalid_chars(s: &str) -> String {
    s.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r' | ' '..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}'))
        .collect()
}
