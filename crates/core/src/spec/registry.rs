//! The pool of registered test trees

use tracing::debug;

use super::{validate, Suite, SuiteNode, TestNode};
use crate::func::Func;
use crate::reporter::Reporter;
use crate::types::{Host, TestType};

/// Registered test trees for one host
#[derive(Clone, Debug)]
pub struct TestRegistry {
    host: Host,
    suites: Vec<Suite>,
}

impl TestRegistry {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            suites: Vec::new(),
        }
    }

    pub fn host(&self) -> Host {
        self.host
    }

    /// Validate and register a tree of the node's own type.
    ///
    /// Returns false when the tree failed validation or can never be
    /// referenced from this host.
    pub fn define(&mut self, node: TestNode, reporter: &Reporter) -> bool {
        let kind = node.kind;
        self.define_as(kind, node, reporter)
    }

    /// Validate and register a tree as `kind`, overriding the node's type.
    pub fn define_as(&mut self, kind: TestType, node: TestNode, reporter: &Reporter) -> bool {
        let Ok(mut suite) = validate(&node, reporter) else {
            debug!("Test {} not registered: invalid specification", node.id);
            return false;
        };
        suite.kind = kind;

        match (self.host, kind) {
            (Host::Native, TestType::BrowserOnly) => {
                // never runs here; keep a reference so it can be dispatched remotely by id
                suite.root = SuiteNode::leaf(suite.root.id.clone(), Func::sync(|_| Ok(())).named("reference"));
            }
            (Host::Browser, TestType::NodeOnly | TestType::Remote) => {
                debug!("Test {} not registered: {} tests cannot run in a browser", suite.id(), kind);
                return false;
            }
            _ => {}
        }

        self.suites.push(suite);
        true
    }

    /// Register an already validated suite.
    pub fn push(&mut self, suite: Suite) {
        self.suites.push(suite);
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    pub fn get(&self, id: &str) -> Option<&Suite> {
        self.suites.iter().find(|s| s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// The pool in execution order.
    pub fn ordered(&self) -> Vec<Suite> {
        order_suites(self.suites.clone())
    }
}

/// Explicitly ordered suites first, ascending; the rest in definition order.
pub fn order_suites(suites: Vec<Suite>) -> Vec<Suite> {
    let (mut ordered, unordered): (Vec<Suite>, Vec<Suite>) = suites.into_iter().partition(|s| s.order.is_some());
    ordered.sort_by(|lhs, rhs| {
        lhs.order
            .unwrap_or_default()
            .total_cmp(&rhs.order.unwrap_or_default())
    });
    ordered.extend(unordered);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::ReporterOptions;
    use crate::spec::SuiteBody;

    fn reporter() -> Reporter {
        Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        })
    }

    fn node(id: &str) -> TestNode {
        TestNode::new(id).test(Func::sync(|_| Ok(())))
    }

    #[test]
    fn test_invalid_tree_not_registered() {
        let mut registry = TestRegistry::new(Host::Native);
        assert!(!registry.define(TestNode::new("broken"), &reporter()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_browser_tree_becomes_reference_on_native() {
        let mut registry = TestRegistry::new(Host::Native);
        let tree = TestNode::new("ui")
            .kind(TestType::BrowserOnly)
            .tests(vec![("a", Func::sync(|_| Ok(()))), ("b", Func::sync(|_| Ok(())))]);
        assert!(registry.define(tree, &reporter()));
        let suite = registry.get("ui").unwrap();
        assert_eq!(suite.kind, TestType::BrowserOnly);
        assert!(matches!(suite.root.body, SuiteBody::Test(_)));
    }

    #[test]
    fn test_browser_host_rejects_node_trees() {
        let mut registry = TestRegistry::new(Host::Browser);
        assert!(!registry.define(node("n").kind(TestType::NodeOnly), &reporter()));
        assert!(registry.define(node("b").kind(TestType::BrowserOnly), &reporter()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ordered_pool() {
        let reporter = reporter();
        let mut registry = TestRegistry::new(Host::Native);
        registry.define(node("first-defined"), &reporter);
        registry.define(node("ten").order(10.0), &reporter);
        registry.define(node("one").order(1.0), &reporter);
        registry.define(node("last-defined"), &reporter);
        let ids: Vec<String> = registry.ordered().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["one", "ten", "first-defined", "last-defined"]);
    }
}
