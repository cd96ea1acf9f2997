//! Error types for malformed test trees.
//!
//! Nothing in the engine is fatal to a run: a suite with the wrong shape
//! becomes a [`StructureError`], which is rendered verbatim as an error leaf
//! in the result tree and counted as a failure.

use crate::node::HookKind;

/// A suite or module whose shape does not match what the runner expects.
///
/// # Error Categories
///
/// - **Hooks**: `beforeEach`, `afterEach` or `after` present but not a function
/// - **Cases**: a non-reserved key whose value is not a function
/// - **Flags**: `_async`, `_focus` or `_skip` present but not a boolean
/// - **Modules**: a host test module that failed to load or is not a suite
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    /// A lifecycle hook key holds something other than a function.
    #[error("{hook} must be a function, got {found}")]
    HookNotCallable {
        /// The hook that was malformed.
        hook: HookKind,
        /// Kind of the value that was found instead.
        found: &'static str,
    },

    /// A test case key holds something other than a function.
    #[error("test case must be a function, got {found}")]
    CaseNotCallable {
        /// Kind of the value that was found instead.
        found: &'static str,
    },

    /// A configuration flag holds something other than a boolean.
    #[error("{flag} must be a boolean, got {found}")]
    FlagNotBool {
        /// The reserved flag key.
        flag: &'static str,
        /// Kind of the value that was found instead.
        found: &'static str,
    },

    /// The host failed to load a test module.
    #[error("failed to load test module {module}: {reason}")]
    ModuleLoad { module: String, reason: String },

    /// A test module loaded, but did not produce a suite.
    #[error("test module {module} must return a suite, got {found}")]
    ModuleNotSuite { module: String, found: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_message_uses_reserved_key() {
        let err = StructureError::HookNotCallable {
            hook: HookKind::BeforeEach,
            found: "string",
        };
        assert_eq!(err.to_string(), "beforeEach must be a function, got string");
    }

    #[test]
    fn test_module_load_message() {
        let err = StructureError::ModuleLoad {
            module: "math.test".to_string(),
            reason: "syntax error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to load test module math.test: syntax error"
        );
    }
}
