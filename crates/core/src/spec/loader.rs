//! Declarative YAML test trees
//!
//! Hooks and tests name functions registered in a [`FunctionRegistry`]:
//!
//! ```yaml
//! id: checkout
//! type: both
//! before: open_cart
//! tests:
//!   - add_item                  # bare function, id = "add_item"
//!   - [remove-item, remove_item] # [id, function] pair
//!   - id: payment
//!     beforeEach: reset_card
//!     tests: [charge, refund]
//! ```
//!
//! Unknown names and unrecognized shapes are kept in the authored tree so
//! that validation reports all of them in one pass.

use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use super::{TestBody, TestEntry, TestNode};
use crate::func::{Func, FuncRef};
use crate::{Error, Result};

/// Named functions available to declarative trees
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    funcs: HashMap<String, Func>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`; the function takes that name.
    pub fn register(&mut self, name: impl Into<String>, func: Func) -> &mut Self {
        let name = name.into();
        self.funcs.insert(name.clone(), func.named(name));
        self
    }

    pub fn with(mut self, name: impl Into<String>, func: Func) -> Self {
        self.register(name, func);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Func> {
        self.funcs.get(name)
    }

    fn resolve(&self, value: &Value) -> FuncRef {
        match value {
            Value::String(name) => match self.funcs.get(name) {
                Some(f) => FuncRef::Func(f.clone()),
                None => FuncRef::Unresolved(format!("unregistered function \"{}\"", name)),
            },
            other => FuncRef::Unresolved(describe(other)),
        }
    }
}

/// Parse one tree from a YAML document.
pub fn from_yaml(yaml: &str, functions: &FunctionRegistry) -> Result<TestNode> {
    let value: Value = serde_yaml::from_str(yaml)?;
    node_from_value(&value, functions)
}

/// Parse one tree from a YAML file.
pub fn from_file(path: &Path, functions: &FunctionRegistry) -> Result<TestNode> {
    let content = std::fs::read_to_string(path)?;
    from_yaml(&content, functions)
}

/// Load every `.yaml`/`.yml` tree beneath `dir`, in path order.
pub fn load_all(dir: &Path, functions: &FunctionRegistry) -> Result<Vec<TestNode>> {
    let mut nodes = Vec::new();

    for entry in walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), err);
                None
            }
        })
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
    {
        nodes.push(from_file(entry.path(), functions)?);
    }

    Ok(nodes)
}

fn node_from_value(value: &Value, functions: &FunctionRegistry) -> Result<TestNode> {
    if !value.is_mapping() {
        return Err(Error::SpecParse(format!(
            "a test node must be a mapping, found {}",
            describe(value)
        )));
    }

    let field = |names: &[&str]| names.iter().find_map(|n| value.get(*n));
    let hook = |names: &[&str]| field(names).map(|v| functions.resolve(v));

    let mut node = TestNode {
        id: value.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
        before: hook(&["before"]),
        before_each: hook(&["beforeEach", "before_each"]),
        after: hook(&["after"]),
        after_each: hook(&["afterEach", "after_each"]),
        finally: hook(&["finally"]),
        order: value.get("order").and_then(Value::as_f64),
        ..Default::default()
    };

    if let Some(kind) = value.get("type") {
        let kind = kind
            .as_str()
            .ok_or_else(|| Error::SpecParse(format!("type must be a string, found {}", describe(kind))))?;
        node.kind = kind.parse()?;
    }

    if let Some(test) = value.get("test") {
        node.test = Some(match test {
            Value::Mapping(_) => TestBody::Node(Box::new(node_from_value(test, functions)?)),
            Value::String(_) => TestBody::Func(functions.resolve(test)),
            other => TestBody::Invalid(describe(other)),
        });
    }

    if let Some(tests) = value.get("tests") {
        node.tests = Some(match tests {
            Value::Sequence(items) => items
                .iter()
                .map(|item| entry_from_value(item, functions))
                .collect::<Result<Vec<_>>>()?,
            other => vec![TestEntry::Unrecognized(describe(other))],
        });
    }

    Ok(node)
}

fn entry_from_value(value: &Value, functions: &FunctionRegistry) -> Result<TestEntry> {
    Ok(match value {
        Value::String(_) => TestEntry::Func(functions.resolve(value)),
        Value::Sequence(pair) if pair.len() == 2 => {
            let id = pair[0].as_str().unwrap_or_default().to_string();
            TestEntry::Pair(id, functions.resolve(&pair[1]))
        }
        Value::Mapping(_) => TestEntry::Node(node_from_value(value, functions)?),
        other => TestEntry::Unrecognized(describe(other)),
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s),
        Value::Sequence(items) => format!("a list of {} item(s)", items.len()),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(tagged) => format!("a value tagged {}", tagged.tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{Reporter, ReporterOptions};
    use crate::spec::{validate, SuiteBody};
    use crate::types::TestType;

    fn functions() -> FunctionRegistry {
        FunctionRegistry::new()
            .with("open_cart", Func::sync(|_| Ok(())))
            .with("add_item", Func::sync(|_| Ok(())))
            .with("remove_item", Func::sync(|_| Ok(())))
    }

    fn reporter() -> Reporter {
        Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_parse_tree() {
        let yaml = r#"
id: checkout
type: browser
order: 3
before: open_cart
tests:
  - add_item
  - [remove-item, remove_item]
  - id: nested
    test: add_item
"#;
        let node = from_yaml(yaml, &functions()).unwrap();
        assert_eq!(node.id, "checkout");
        assert_eq!(node.kind, TestType::BrowserOnly);
        assert_eq!(node.order, Some(3.0));

        let suite = validate(&node, &reporter()).unwrap();
        let SuiteBody::Nodes(children) = &suite.root.body else {
            panic!("expected children");
        };
        let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["add_item", "remove-item", "nested"]);
    }

    #[test]
    fn test_unknown_names_reported_by_validation() {
        let yaml = r#"
id: broken
afterEach: missing_hook
tests:
  - missing_test
  - 17
  - [7, add_item]
"#;
        let node = from_yaml(yaml, &functions()).unwrap();
        let errors = validate(&node, &reporter()).unwrap_err();
        let reasons: Vec<&str> = errors.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(errors.len(), 4);
        assert!(reasons[0].starts_with("scaffold afterEach must be a function"));
        assert!(reasons[1].starts_with("[0]test is not a function"));
        assert!(reasons[2].starts_with("[1]don't know what test is"));
        assert_eq!(reasons[3], "[2]each test must have an identifier");
    }

    #[test]
    fn test_non_mapping_document() {
        assert!(matches!(from_yaml("- a\n- b\n", &functions()), Err(Error::SpecParse(_))));
    }

    #[test]
    fn test_unknown_type() {
        assert!(from_yaml("id: x\ntype: desktop\ntest: add_item\n", &functions()).is_err());
    }

    #[test]
    fn test_load_all_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "id: b\ntest: add_item\n").unwrap();
        std::fs::write(dir.path().join("a.yml"), "id: a\ntest: add_item\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let nodes = load_all(dir.path(), &functions()).unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_load_all_skips_unreadable_entries() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(load_all(&missing, &functions()).unwrap().is_empty());

        std::fs::write(dir.path().join("a.yaml"), "id: a\ntest: add_item\n").unwrap();
        let nodes = load_all(dir.path(), &functions()).unwrap();
        assert_eq!(nodes.len(), 1);
    }
}
