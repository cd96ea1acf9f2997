//! Configuration schema definitions for arbor.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files.
//!
//! # Schema Overview
//!
//! ```text
//! EngineConfig (root)
//! ├── RunConfig       - Scheduling mode, hook policy, watcher timing
//! ├── ReportConfig    - Console and JUnit output settings
//! └── Bindings        - Values injected into every case context
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::node::MODULE_SUFFIX;
use crate::task_group::WatchSchedule;
use crate::value::Bindings;

/// Root configuration structure for arbor.
///
/// Every section is optional; an empty file yields the defaults.
///
/// # Example
///
/// ```
/// use arbor::config::EngineConfig;
///
/// let config: EngineConfig = toml::from_str(r#"
///     [run]
///     concurrent = false
///
///     [bindings]
///     base_url = "http://localhost:8080"
/// "#).unwrap();
///
/// assert!(!config.run.concurrent);
/// assert!(config.report.junit.is_none());
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Run settings (scheduling, hooks, watcher).
    #[serde(default)]
    pub run: RunConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Bindings injected into every case's context.
    #[serde(default)]
    pub bindings: Bindings,
}

/// Core run settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `concurrent` | true |
/// | `silent` | false |
/// | `after_each_policy` | `record` |
/// | `module_suffix` | `.test` |
/// | `watch_initial_ms` | 1000 |
/// | `watch_interval_ms` | 5000 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Default scheduling mode for suites without `_async`.
    ///
    /// Default: true
    #[serde(default = "default_concurrent")]
    pub concurrent: bool,

    /// Suppress the console report.
    ///
    /// Counts are still returned to the caller.
    ///
    /// Default: false
    #[serde(default)]
    pub silent: bool,

    /// What an `afterEach` failure does to the case it ran after.
    ///
    /// Default: `record`
    #[serde(default)]
    pub after_each_policy: AfterEachPolicy,

    /// Name suffix marking test modules in host trees.
    ///
    /// Default: `.test`
    #[serde(default = "default_module_suffix")]
    pub module_suffix: String,

    /// Delay before the watcher first reports outstanding work.
    ///
    /// Default: 1000
    #[serde(default = "default_watch_initial_ms")]
    pub watch_initial_ms: u64,

    /// Delay between subsequent watcher reports.
    ///
    /// Default: 5000
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,
}

impl RunConfig {
    /// The watcher schedule described by this config.
    pub fn watch_schedule(&self) -> WatchSchedule {
        WatchSchedule {
            initial: Duration::from_millis(self.watch_initial_ms),
            interval: Duration::from_millis(self.watch_interval_ms),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrent: default_concurrent(),
            silent: false,
            after_each_policy: AfterEachPolicy::default(),
            module_suffix: default_module_suffix(),
            watch_initial_ms: default_watch_initial_ms(),
            watch_interval_ms: default_watch_interval_ms(),
        }
    }
}

fn default_concurrent() -> bool {
    true
}

fn default_module_suffix() -> String {
    MODULE_SUFFIX.to_string()
}

fn default_watch_initial_ms() -> u64 {
    1000
}

fn default_watch_interval_ms() -> u64 {
    5000
}

/// How an `afterEach` failure interacts with the case result.
///
/// | Policy | Case result | Hook failure |
/// |--------|-------------|--------------|
/// | `record` | kept | recorded under `afterEach` |
/// | `replace` | removed (unless skipped) | recorded under `afterEach` |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AfterEachPolicy {
    /// Keep the case outcome and record the hook failure next to it.
    #[default]
    Record,

    /// Discard the case outcome in favor of the hook failure.
    Replace,
}

/// Report configuration.
///
/// # Example
///
/// ```toml
/// [report]
/// junit = "target/arbor-junit.xml"
/// testsuites_name = "my-project"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Write a JUnit XML report to this path.
    pub junit: Option<PathBuf>,

    /// Announce every suite on the console as it finishes.
    ///
    /// Default: false
    #[serde(default)]
    pub verbose: bool,

    /// Name of the top-level `<testsuites>` element.
    ///
    /// Default: `arbor`
    #[serde(default = "default_testsuites_name")]
    pub testsuites_name: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            junit: None,
            verbose: false,
            testsuites_name: default_testsuites_name(),
        }
    }
}

fn default_testsuites_name() -> String {
    "arbor".to_string()
}
