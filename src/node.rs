//! Discovery: turning host input into a typed tree of nodes.
//!
//! Input arrives either as a nested [`Value`] map or as a host-supplied
//! [`HostNode`] tree. Both are classified exactly once into [`Node`]s, so the
//! walker never has to re-inspect shapes while running.
//!
//! # Classification rules
//!
//! | Input | Node |
//! |-------|------|
//! | function | [`Node::Case`] |
//! | map with a reserved key or a function entry | [`Node::Suite`] |
//! | any other map | [`Node::Container`] |
//! | malformed suite, failed module load | [`Node::Invalid`] |
//!
//! Inside a suite, map-valued entries become child nodes that sit next to
//! the suite's own cases in the result tree.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::StructureError;
use crate::value::{Callable, Value};

/// Default suffix identifying test modules in a host tree.
pub const MODULE_SUFFIX: &str = ".test";

/// Keys a suite reserves for configuration. Every other key is a test case.
pub const RESERVED_KEYS: [&str; 6] = [
    "_async",
    "_focus",
    "_skip",
    "beforeEach",
    "afterEach",
    "after",
];

/// The three suite lifecycle hooks.
///
/// Hook failures are keyed by this type, never by a string, so they cannot
/// collide with a case of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HookKind {
    /// Runs before every case.
    #[serde(rename = "beforeEach")]
    BeforeEach,

    /// Runs after every case.
    #[serde(rename = "afterEach")]
    AfterEach,

    /// Runs once after all cases of the suite completed.
    #[serde(rename = "after")]
    After,
}

impl HookKind {
    /// The reserved key naming this hook.
    pub fn key(self) -> &'static str {
        match self {
            HookKind::BeforeEach => "beforeEach",
            HookKind::AfterEach => "afterEach",
            HookKind::After => "after",
        }
    }

    /// Parses a reserved hook key.
    pub fn from_key(key: &str) -> Option<HookKind> {
        match key {
            "beforeEach" => Some(HookKind::BeforeEach),
            "afterEach" => Some(HookKind::AfterEach),
            "after" => Some(HookKind::After),
            _ => None,
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Tri-state `_async` setting of a suite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AsyncMode {
    /// Use the mode of the enclosing level.
    #[default]
    Inherit,

    /// Run cases concurrently.
    Concurrent,

    /// Run cases one after another.
    Sequential,
}

impl AsyncMode {
    /// Resolves against the ambient mode; `true` means concurrent.
    pub fn resolve(self, ambient: bool) -> bool {
        match self {
            AsyncMode::Inherit => ambient,
            AsyncMode::Concurrent => true,
            AsyncMode::Sequential => false,
        }
    }
}

/// Configuration read from a suite's reserved keys.
#[derive(Debug, Clone, Default)]
pub struct SuiteConfig {
    pub async_mode: AsyncMode,
    pub focus: bool,
    pub skip: bool,
    pub before_each: Option<Callable>,
    pub after_each: Option<Callable>,
    pub after: Option<Callable>,
}

impl SuiteConfig {
    /// Returns the hook of the given kind, if present.
    pub fn hook(&self, kind: HookKind) -> Option<&Callable> {
        match kind {
            HookKind::BeforeEach => self.before_each.as_ref(),
            HookKind::AfterEach => self.after_each.as_ref(),
            HookKind::After => self.after.as_ref(),
        }
    }

    fn set_hook(&mut self, kind: HookKind, hook: Option<Callable>) {
        match kind {
            HookKind::BeforeEach => self.before_each = hook,
            HookKind::AfterEach => self.after_each = hook,
            HookKind::After => self.after = hook,
        }
    }
}

/// A non-reserved entry of a suite.
#[derive(Debug, Clone)]
pub enum SuiteEntry {
    Case(Callable),
    /// A key that should have been a case but is not callable.
    Invalid(StructureError),
}

/// A runnable suite: configuration plus named cases.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    pub config: SuiteConfig,
    pub entries: BTreeMap<String, SuiteEntry>,
}

impl Suite {
    /// A suite holding one case and no hooks.
    pub fn single(name: impl Into<String>, case: Callable) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(name.into(), SuiteEntry::Case(case));
        Self {
            config: SuiteConfig::default(),
            entries,
        }
    }
}

/// A classified node of the test tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// Named children, not runnable itself.
    Container(BTreeMap<String, Node>),

    /// A runnable suite, optionally with nested child nodes.
    Suite {
        suite: Suite,
        children: BTreeMap<String, Node>,
    },

    /// A lone case outside of any suite.
    Case(Callable),

    /// A node whose shape could not be understood.
    Invalid(StructureError),
}

/// A host-supplied tree of test modules.
///
/// Hosts expose folders through [`children`](Self::children) and test
/// modules (nodes whose name ends with the module suffix) through
/// [`load`](Self::load).
pub trait HostNode: Send + Sync {
    /// Name of this node, e.g. `math.test` or `unit`.
    fn name(&self) -> &str;

    /// Child nodes of a folder, or modules nested under a module.
    fn children(&self) -> Vec<Arc<dyn HostNode>>;

    /// Loads a test module into a value.
    fn load(&self) -> Result<Value, String>;
}

impl Node {
    /// Classifies a value. Scalars produce no node.
    pub fn from_value(value: &Value) -> Option<Node> {
        match value {
            Value::Func(f) => Some(Node::Case(f.clone())),
            Value::Map(map) if is_suite(map) => {
                Some(parse_suite(map).unwrap_or_else(Node::Invalid))
            }
            Value::Map(map) => Some(Node::Container(
                map.iter()
                    .filter_map(|(name, child)| {
                        Node::from_value(child).map(|node| (name.clone(), node))
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Classifies a host tree.
    ///
    /// Module names have `suffix` stripped in the resulting tree. A module
    /// may itself hold nested modules, which sit next to its own cases.
    /// Folders without any modules underneath produce no node.
    pub fn from_host(host: &dyn HostNode, suffix: &str) -> Option<Node> {
        let name = host.name();
        let children = host_children(host, suffix);

        if let Some(key) = name.strip_suffix(suffix) {
            let module = match host.load() {
                Ok(value @ (Value::Map(_) | Value::Func(_))) => {
                    Node::from_value(&value).unwrap_or(Node::Container(BTreeMap::new()))
                }
                Ok(other) => Node::Invalid(StructureError::ModuleNotSuite {
                    module: name.to_string(),
                    found: other.kind(),
                }),
                Err(reason) => Node::Invalid(StructureError::ModuleLoad {
                    module: name.to_string(),
                    reason,
                }),
            };
            return Some(module.with_children(key, children));
        }

        if children.is_empty() {
            None
        } else {
            Some(Node::Container(children))
        }
    }

    /// Attaches nested nodes next to whatever this node already holds.
    ///
    /// A lone case becomes a one-case suite named `name`. An invalid node
    /// stays an error leaf and drops `nested`.
    fn with_children(self, name: &str, nested: BTreeMap<String, Node>) -> Node {
        if nested.is_empty() {
            return self;
        }
        match self {
            Node::Container(mut entries) => {
                entries.extend(nested);
                Node::Container(entries)
            }
            Node::Suite {
                suite,
                mut children,
            } => {
                children.extend(nested);
                Node::Suite { suite, children }
            }
            Node::Case(case) => Node::Suite {
                suite: Suite::single(name, case),
                children: nested,
            },
            Node::Invalid(err) => Node::Invalid(err),
        }
    }
}

fn host_children(host: &dyn HostNode, suffix: &str) -> BTreeMap<String, Node> {
    host.children()
        .iter()
        .filter_map(|child| {
            let child_name = child.name();
            let key = child_name.strip_suffix(suffix).unwrap_or(child_name);
            Node::from_host(child.as_ref(), suffix).map(|node| (key.to_string(), node))
        })
        .collect()
}

fn is_suite(map: &BTreeMap<String, Value>) -> bool {
    map.iter().any(|(key, value)| {
        RESERVED_KEYS.contains(&key.as_str()) || matches!(value, Value::Func(_))
    })
}

fn flag(name: &'static str, value: &Value) -> Result<bool, StructureError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Nil => Ok(false),
        other => Err(StructureError::FlagNotBool {
            flag: name,
            found: other.kind(),
        }),
    }
}

fn parse_suite(map: &BTreeMap<String, Value>) -> Result<Node, StructureError> {
    let mut config = SuiteConfig::default();
    let mut entries = BTreeMap::new();
    let mut children = BTreeMap::new();

    for (key, value) in map {
        match key.as_str() {
            "_async" => {
                config.async_mode = match value {
                    Value::Bool(true) => AsyncMode::Concurrent,
                    Value::Bool(false) => AsyncMode::Sequential,
                    Value::Nil => AsyncMode::Inherit,
                    other => {
                        return Err(StructureError::FlagNotBool {
                            flag: "_async",
                            found: other.kind(),
                        });
                    }
                }
            }
            "_focus" => config.focus = flag("_focus", value)?,
            "_skip" => config.skip = flag("_skip", value)?,
            _ => {
                if let Some(hook) = HookKind::from_key(key) {
                    let callable = match value {
                        Value::Func(f) => Some(f.clone()),
                        Value::Nil => None,
                        other => {
                            return Err(StructureError::HookNotCallable {
                                hook,
                                found: other.kind(),
                            });
                        }
                    };
                    config.set_hook(hook, callable);
                    continue;
                }

                match value {
                    Value::Func(f) => {
                        entries.insert(key.clone(), SuiteEntry::Case(f.clone()));
                    }
                    Value::Map(_) => {
                        if let Some(child) = Node::from_value(value) {
                            children.insert(key.clone(), child);
                        }
                    }
                    other => {
                        entries.insert(
                            key.clone(),
                            SuiteEntry::Invalid(StructureError::CaseNotCallable {
                                found: other.kind(),
                            }),
                        );
                    }
                }
            }
        }
    }

    Ok(Node::Suite {
        suite: Suite { config, entries },
        children,
    })
}

/// Joins a parent path and a child name with `/`.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Outcome;

    fn pass() -> Value {
        Value::func(|_| Ok(Outcome::Done))
    }

    struct Folder {
        name: String,
        children: Vec<Arc<dyn HostNode>>,
    }

    impl HostNode for Folder {
        fn name(&self) -> &str {
            &self.name
        }

        fn children(&self) -> Vec<Arc<dyn HostNode>> {
            self.children.clone()
        }

        fn load(&self) -> Result<Value, String> {
            Err("folders cannot be loaded".to_string())
        }
    }

    struct Module {
        name: String,
        value: Result<Value, String>,
        nested: Vec<Arc<dyn HostNode>>,
    }

    impl HostNode for Module {
        fn name(&self) -> &str {
            &self.name
        }

        fn children(&self) -> Vec<Arc<dyn HostNode>> {
            self.nested.clone()
        }

        fn load(&self) -> Result<Value, String> {
            self.value.clone()
        }
    }

    #[test]
    fn test_map_with_function_is_suite() {
        let value = Value::map([("adds", pass()), ("_focus", Value::Bool(true))]);
        match Node::from_value(&value) {
            Some(Node::Suite { suite, children }) => {
                assert!(suite.config.focus);
                assert_eq!(suite.entries.len(), 1);
                assert!(children.is_empty());
            }
            other => panic!("expected suite, got {:?}", other),
        }
    }

    #[test]
    fn test_reserved_key_alone_makes_suite() {
        let value = Value::map([("_skip", Value::Bool(true))]);
        assert!(matches!(
            Node::from_value(&value),
            Some(Node::Suite { .. })
        ));
    }

    #[test]
    fn test_map_of_maps_is_container() {
        let value = Value::map([
            ("math", Value::map([("adds", pass())])),
            ("notes", Value::from("ignored")),
        ]);
        match Node::from_value(&value) {
            Some(Node::Container(children)) => {
                assert_eq!(children.len(), 1);
                assert!(matches!(children.get("math"), Some(Node::Suite { .. })));
            }
            other => panic!("expected container, got {:?}", other),
        }
    }

    #[test]
    fn test_suite_with_nested_children() {
        let value = Value::map([
            ("adds", pass()),
            ("nested", Value::map([("subtracts", pass())])),
        ]);
        match Node::from_value(&value) {
            Some(Node::Suite { suite, children }) => {
                assert!(suite.entries.contains_key("adds"));
                assert!(children.contains_key("nested"));
            }
            other => panic!("expected suite, got {:?}", other),
        }
    }

    #[test]
    fn test_hook_not_callable_is_invalid() {
        let value = Value::map([("adds", pass()), ("beforeEach", Value::from(1_i64))]);
        match Node::from_value(&value) {
            Some(Node::Invalid(err)) => {
                assert_eq!(err.to_string(), "beforeEach must be a function, got integer");
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_flag_not_bool_is_invalid() {
        let value = Value::map([("adds", pass()), ("_async", Value::from("yes"))]);
        assert!(matches!(
            Node::from_value(&value),
            Some(Node::Invalid(StructureError::FlagNotBool { flag: "_async", .. }))
        ));
    }

    #[test]
    fn test_non_callable_case_is_entry_error() {
        let value = Value::map([("adds", pass()), ("broken", Value::from(true))]);
        match Node::from_value(&value) {
            Some(Node::Suite { suite, .. }) => {
                assert!(matches!(
                    suite.entries.get("broken"),
                    Some(SuiteEntry::Invalid(StructureError::CaseNotCallable { found: "boolean" }))
                ));
            }
            other => panic!("expected suite, got {:?}", other),
        }
    }

    #[test]
    fn test_async_mode_resolution() {
        assert!(AsyncMode::Inherit.resolve(true));
        assert!(!AsyncMode::Inherit.resolve(false));
        assert!(AsyncMode::Concurrent.resolve(false));
        assert!(!AsyncMode::Sequential.resolve(true));
    }

    #[test]
    fn test_scalar_is_not_a_node() {
        assert!(Node::from_value(&Value::from(3.5)).is_none());
        assert!(Node::from_value(&Value::Nil).is_none());
    }

    #[test]
    fn test_host_tree_discovery() {
        let tree = Folder {
            name: "tests".to_string(),
            children: vec![
                Arc::new(Module {
                    name: "math.test".to_string(),
                    value: Ok(Value::map([("adds", pass())])),
                    nested: Vec::new(),
                }),
                Arc::new(Module {
                    name: "helpers".to_string(),
                    value: Ok(Value::Nil),
                    nested: Vec::new(),
                }),
                Arc::new(Module {
                    name: "broken.test".to_string(),
                    value: Err("unexpected token".to_string()),
                    nested: Vec::new(),
                }),
                Arc::new(Folder {
                    name: "empty".to_string(),
                    children: Vec::new(),
                }),
            ],
        };

        match Node::from_host(&tree, MODULE_SUFFIX) {
            Some(Node::Container(children)) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children.get("math"), Some(Node::Suite { .. })));
                assert!(matches!(
                    children.get("broken"),
                    Some(Node::Invalid(StructureError::ModuleLoad { .. }))
                ));
            }
            other => panic!("expected container, got {:?}", other),
        }
    }

    #[test]
    fn test_host_module_returning_scalar() {
        let module = Module {
            name: "odd.test".to_string(),
            value: Ok(Value::from(7_i64)),
            nested: Vec::new(),
        };
        assert!(matches!(
            Node::from_host(&module, MODULE_SUFFIX),
            Some(Node::Invalid(StructureError::ModuleNotSuite { found: "integer", .. }))
        ));
    }

    #[test]
    fn test_host_module_keeps_nested_modules() {
        let module = Module {
            name: "parent.test".to_string(),
            value: Ok(Value::map([("own", pass())])),
            nested: vec![Arc::new(Module {
                name: "child.test".to_string(),
                value: Ok(Value::map([("inner", pass())])),
                nested: Vec::new(),
            })],
        };

        match Node::from_host(&module, MODULE_SUFFIX) {
            Some(Node::Suite { suite, children }) => {
                assert!(suite.entries.contains_key("own"));
                assert!(matches!(children.get("child"), Some(Node::Suite { .. })));
            }
            other => panic!("expected suite, got {:?}", other),
        }
    }

    #[test]
    fn test_host_function_module_with_nested_modules() {
        let module = Module {
            name: "check.test".to_string(),
            value: Ok(pass()),
            nested: vec![Arc::new(Module {
                name: "deeper.test".to_string(),
                value: Ok(Value::map([("inner", pass())])),
                nested: Vec::new(),
            })],
        };

        match Node::from_host(&module, MODULE_SUFFIX) {
            Some(Node::Suite { suite, children }) => {
                assert!(matches!(suite.entries.get("check"), Some(SuiteEntry::Case(_))));
                assert!(children.contains_key("deeper"));
            }
            other => panic!("expected suite, got {:?}", other),
        }
    }

    #[test]
    fn test_suite_config_hook_lookup() {
        let value = Value::map([("a", pass()), ("after", pass())]);
        let Some(Node::Suite { suite, .. }) = Node::from_value(&value) else {
            panic!("expected suite");
        };
        assert!(suite.config.hook(HookKind::After).is_some());
        assert!(suite.config.hook(HookKind::BeforeEach).is_none());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "math"), "math");
        assert_eq!(join_path("unit/math", "adds"), "unit/math/adds");
    }
}
