//! Configuration loading and schema definitions for arbor.
//!
//! Configuration is optional: every setting has a default, and
//! [`RunOptions`](crate::RunOptions) can be built directly in code. A TOML
//! file is convenient when the same settings are shared by several hosts.
//!
//! # The Configuration File Format
//!
//! ```toml
//! [run]
//! concurrent = true
//! silent = false
//! after_each_policy = "record"
//!
//! [report]
//! junit = "target/arbor-junit.xml"
//! verbose = false
//!
//! [bindings]
//! answer = 42
//! ```

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads arbor configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use arbor::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("arbor.toml"))?;
/// println!("Concurrent: {}", config.run.concurrent);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: EngineConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads arbor configuration from a TOML string.
///
/// # Example
///
/// ```
/// use arbor::config::{AfterEachPolicy, load_config_str};
///
/// let config = load_config_str(r#"
///     [run]
///     concurrent = false
///     after_each_policy = "replace"
/// "#)?;
///
/// assert!(!config.run.concurrent);
/// assert_eq!(config.run.after_each_policy, AfterEachPolicy::Replace);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[run]
silent = true
watch_interval_ms = 250

[bindings]
name = "arbor"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(config.run.silent);
        assert!(config.run.concurrent);
        assert_eq!(config.run.watch_interval_ms, 250);
        assert_eq!(
            config.bindings.get("name"),
            Some(&serde_json::json!("arbor"))
        );
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/arbor.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_invalid_policy() {
        let err = load_config_str("[run]\nafter_each_policy = \"sometimes\"\n").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
