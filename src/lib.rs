//! arbor: a concurrent test-execution engine for hierarchical suites.
//!
//! The host hands the engine a tree of suites (an in-memory [`Value`] map or
//! a [`HostNode`] tree of test modules). The engine discovers the suites,
//! runs every case either concurrently or sequentially, waits for all of them
//! deterministically, and returns a [`RunReport`] with the result tree and
//! pass/fail/skip counts.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Discovery** ([`node`]): Classifies input values into containers, suites and cases
//! - **TaskGroup** ([`task_group`]): Join-counter coordinating spawned units of work
//! - **CaseRunner** ([`case`]): Runs a single case with its `beforeEach`/`afterEach` hooks
//! - **SuiteRunner** ([`suite`]): Fans a suite's cases out through a task group
//! - **TreeWalker** ([`walker`]): Recurses through the tree and applies focus pruning
//! - **Report** ([`report`]): Counts outcomes and renders console or JUnit output
//!
//! # Example
//!
//! ```no_run
//! use arbor::{Outcome, RunOptions, Runner, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let suite = Value::map([
//!         ("adds", Value::func(|_| {
//!             if 1 + 1 == 2 { Ok(Outcome::Done) } else { Err("math is broken".into()) }
//!         })),
//!         ("later", Value::func(|_| Ok(Outcome::Skip))),
//!     ]);
//!
//!     let runner = Runner::new(RunOptions::default());
//!     let report = runner.run(Value::map([("math", suite)])).await;
//!     std::process::exit(if report.success() { 0 } else { 1 });
//! }
//! ```

pub mod case;
pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod report;
pub mod result;
pub mod runner;
pub mod suite;
pub mod task_group;
pub mod value;
pub mod walker;

// Re-export commonly used types
pub use config::{AfterEachPolicy, EngineConfig, load_config, load_config_str};
pub use error::StructureError;
pub use node::{AsyncMode, HookKind, HostNode, Node, Suite, SuiteConfig};
pub use report::{ConsoleReporter, JUnitReporter, MultiReporter, NullReporter, Reporter};
pub use result::{CaseResult, Counts, ResultNode, ResultTree, SuiteResult, count};
pub use runner::{RunOptions, RunReport, Runner, Target, run};
pub use task_group::{TaskGroup, WatchSchedule};
pub use value::{
    Awaitable, Bindings, Callable, CaseContext, Completion, Deferred, FutureAwaitable, Outcome,
    Resolver, Value,
};
