//! Specification validation
//!
//! Walks an authored tree once, collecting every structural problem rather
//! than stopping at the first, and reports each under
//! [`category::BAD_TEST_SPEC`] with the slash-joined path of the offending
//! node.

use std::collections::HashSet;

use super::{Hooks, Suite, SuiteBody, SuiteNode, TestBody, TestEntry, TestNode};
use crate::func::{Func, FuncRef};
use crate::reporter::{category, Entry, Reporter};

/// A single problem found in an authored tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecError {
    pub path: String,
    pub reason: String,
}

impl std::fmt::Display for SpecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Validate `node`, returning the clean suite or every error found.
pub fn validate(node: &TestNode, reporter: &Reporter) -> Result<Suite, Vec<SpecError>> {
    let mut validator = Validator {
        context: Vec::new(),
        errors: Vec::new(),
    };
    let root = validator.node(node);

    for error in &validator.errors {
        reporter.log(
            category::BAD_TEST_SPEC,
            None,
            vec![Entry::from(error.path.as_str()), Entry::from(error.reason.as_str())],
            false,
        );
    }

    match root {
        Some(root) if validator.errors.is_empty() => Ok(Suite {
            root,
            kind: node.kind,
            order: node.order,
        }),
        _ => Err(validator.errors),
    }
}

struct Validator {
    context: Vec<String>,
    errors: Vec<SpecError>,
}

impl Validator {
    fn error(&mut self, reason: impl Into<String>) {
        self.errors.push(SpecError {
            path: self.context.join("/"),
            reason: reason.into(),
        });
    }

    fn node(&mut self, node: &TestNode) -> Option<SuiteNode> {
        self.context.push(node.id.clone());
        let result = self.node_body(node);
        self.context.pop();
        result
    }

    fn node_body(&mut self, node: &TestNode) -> Option<SuiteNode> {
        let mut ok = true;
        if node.id.trim().is_empty() {
            self.error("each test must have a non-empty identifier");
            ok = false;
        }

        let hooks = Hooks {
            before: self.hook("before", node.before.as_ref(), &mut ok),
            before_each: self.hook("beforeEach", node.before_each.as_ref(), &mut ok),
            after: self.hook("after", node.after.as_ref(), &mut ok),
            after_each: self.hook("afterEach", node.after_each.as_ref(), &mut ok),
            finally: self.hook("finally", node.finally.as_ref(), &mut ok),
        };

        let body = match (&node.test, &node.tests) {
            (None, None) => {
                self.error("test or tests must be specified for each node in the test tree");
                None
            }
            (Some(test), Some(tests)) => {
                self.error("one of test or tests (not both) allowed for each node in the test tree");
                // keep walking so errors beneath are reported in the same pass
                self.body(test);
                self.entries(tests);
                None
            }
            (Some(test), None) => self.body(test),
            (None, Some(tests)) => self.entries(tests).map(SuiteBody::Nodes),
        };

        match body {
            Some(body) if ok => Some(SuiteNode {
                id: node.id.clone(),
                hooks,
                body,
            }),
            _ => None,
        }
    }

    fn hook(&mut self, name: &str, slot: Option<&FuncRef>, ok: &mut bool) -> Option<Func> {
        match slot? {
            FuncRef::Func(f) => Some(f.clone()),
            FuncRef::Unresolved(found) => {
                self.error(format!("scaffold {} must be a function (found {})", name, found));
                *ok = false;
                None
            }
        }
    }

    fn body(&mut self, test: &TestBody) -> Option<SuiteBody> {
        match test {
            TestBody::Func(FuncRef::Func(f)) => Some(SuiteBody::Test(f.clone())),
            TestBody::Node(child) => self.node(child).map(|n| SuiteBody::Node(Box::new(n))),
            TestBody::Func(FuncRef::Unresolved(found)) | TestBody::Invalid(found) => {
                self.error(format!(
                    "test must be either a test object or a function (found {})",
                    found
                ));
                None
            }
        }
    }

    fn entries(&mut self, tests: &[TestEntry]) -> Option<Vec<SuiteNode>> {
        let mut ok = true;
        let mut ordered: Vec<(f64, SuiteNode)> = Vec::new();
        let mut unordered: Vec<SuiteNode> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (i, entry) in tests.iter().enumerate() {
            let (child, order) = match entry {
                TestEntry::Func(FuncRef::Func(f)) => {
                    if f.name().is_empty() {
                        self.error(format!("[{}]each test must have an identifier", i));
                        (None, None)
                    } else {
                        (Some(SuiteNode::leaf(f.name(), f.clone())), None)
                    }
                }
                TestEntry::Func(FuncRef::Unresolved(found)) => {
                    self.error(format!("[{}]test is not a function (found {})", i, found));
                    (None, None)
                }
                TestEntry::Pair(id, f) => {
                    if id.trim().is_empty() {
                        self.error(format!("[{}]each test must have an identifier", i));
                        (None, None)
                    } else {
                        match f {
                            FuncRef::Func(f) => (Some(SuiteNode::leaf(id.clone(), f.clone())), None),
                            FuncRef::Unresolved(found) => {
                                self.error(format!("[{}]test is not a function (found {})", id, found));
                                (None, None)
                            }
                        }
                    }
                }
                TestEntry::Node(node) => (self.node(node), node.order),
                TestEntry::Unrecognized(found) => {
                    self.error(format!(
                        "[{}]don't know what test is; should be a [id, test (a function)] pair, \
                         a test (a function) or a test object (found {})",
                        i, found
                    ));
                    (None, None)
                }
            };

            let Some(child) = child else {
                ok = false;
                continue;
            };
            if !seen.insert(child.id.clone()) {
                self.error(format!("[{}]identifier is not unique among its siblings", child.id));
                ok = false;
                continue;
            }
            match order {
                Some(order) => ordered.push((order, child)),
                None => unordered.push(child),
            }
        }

        if !ok {
            return None;
        }
        ordered.sort_by(|lhs, rhs| lhs.0.total_cmp(&rhs.0));
        Some(ordered.into_iter().map(|(_, n)| n).chain(unordered).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::ReporterOptions;

    fn reporter() -> Reporter {
        Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        })
    }

    fn pass() -> Func {
        Func::sync(|_| Ok(()))
    }

    fn alpha(_cx: crate::CallContext) -> crate::TestResult {
        Ok(())
    }

    #[test]
    fn test_valid_tree() {
        let node = TestNode::new("root")
            .before(pass())
            .tests(vec![
                TestEntry::pair("p", pass()),
                Func::sync(alpha).into(),
                TestNode::new("group").test(pass()).into(),
            ]);
        let suite = validate(&node, &reporter()).unwrap();
        assert_eq!(suite.id(), "root");
        assert!(suite.root.hooks.before.is_some());
        let SuiteBody::Nodes(children) = &suite.root.body else {
            panic!("expected children");
        };
        let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["p", "alpha", "group"]);
    }

    #[test]
    fn test_collects_all_errors_in_one_pass() {
        let reporter = reporter();
        let node = TestNode::new("root").tests(vec![
            TestNode::new("").test(pass()).into(),
            TestNode::new("both").test(pass()).tests(vec![TestEntry::pair("x", pass())]).into(),
            TestNode::new("neither").into(),
            TestEntry::Unrecognized("42".to_string()),
        ]);
        let errors = validate(&node, &reporter).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(errors[0].path, "root/");
        assert_eq!(errors[1].path, "root/both");
        assert_eq!(errors[2].path, "root/neither");
        assert!(errors[3].reason.starts_with("[3]don't know what test is"));
        assert_eq!(reporter.get_log(category::BAD_TEST_SPEC).unwrap().len(), 4);
    }

    #[test]
    fn test_unresolved_hook_is_error() {
        let node = TestNode::new("root")
            .before_each(FuncRef::Unresolved("\"setup\"".to_string()))
            .test(pass());
        let errors = validate(&node, &reporter()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.starts_with("scaffold beforeEach must be a function"));
    }

    #[test]
    fn test_anonymous_bare_function_is_error() {
        let node = TestNode::new("root").tests(vec![pass()]);
        let errors = validate(&node, &reporter()).unwrap_err();
        assert_eq!(errors[0].reason, "[0]each test must have an identifier");
    }

    #[test]
    fn test_bare_fn_pointer_is_error() {
        let pointer: fn(crate::CallContext) -> crate::TestResult = alpha;
        let node = TestNode::new("root").tests(vec![Func::sync(alpha), Func::sync(pointer)]);
        let errors = validate(&node, &reporter()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].reason, "[1]each test must have an identifier");
    }

    #[test]
    fn test_duplicate_sibling_ids() {
        let node = TestNode::new("root").tests(vec![TestEntry::pair("a", pass()), TestEntry::pair("a", pass())]);
        let errors = validate(&node, &reporter()).unwrap_err();
        assert!(errors[0].reason.contains("not unique"));
    }

    #[test]
    fn test_explicit_order_sorts_first() {
        let node = TestNode::new("root").tests(vec![
            TestEntry::pair("plain", pass()),
            TestNode::new("late").order(2.0).test(pass()).into(),
            TestNode::new("early").order(1.0).test(pass()).into(),
        ]);
        let suite = validate(&node, &reporter()).unwrap();
        let SuiteBody::Nodes(children) = &suite.root.body else {
            panic!("expected children");
        };
        let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "plain"]);
    }
}
