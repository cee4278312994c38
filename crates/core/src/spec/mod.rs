//! Test specification model
//!
//! A [`TestNode`] is what users author: an id, optional scaffolds and either
//! a single `test` or a list of `tests`. Authored trees are deliberately
//! permissive; [`validate`] turns one into a [`Suite`] of [`SuiteNode`]s that
//! holds only resolved functions and well-formed children.

pub mod loader;
pub mod registry;
pub mod validate;

pub use loader::FunctionRegistry;
pub use registry::{order_suites, TestRegistry};
pub use validate::{validate, SpecError};

use crate::func::{Func, FuncRef};
use crate::types::{Phase, TestType};

/// A node of a user-authored test tree
#[derive(Clone, Debug, Default)]
pub struct TestNode {
    pub id: String,
    pub before: Option<FuncRef>,
    pub before_each: Option<FuncRef>,
    pub after: Option<FuncRef>,
    pub after_each: Option<FuncRef>,
    pub finally: Option<FuncRef>,
    pub test: Option<TestBody>,
    pub tests: Option<Vec<TestEntry>>,
    pub order: Option<f64>,
    pub kind: TestType,
}

/// Value of a node's `test` slot
#[derive(Clone, Debug)]
pub enum TestBody {
    Func(FuncRef),
    Node(Box<TestNode>),
    /// Anything else; carries a description of what was found
    Invalid(String),
}

/// One element of a node's `tests` list
#[derive(Clone, Debug)]
pub enum TestEntry {
    /// A bare function; its id is the function's name
    Func(FuncRef),
    /// An `[id, function]` pair
    Pair(String, FuncRef),
    Node(TestNode),
    /// Anything else; carries a description of what was found
    Unrecognized(String),
}

impl TestEntry {
    pub fn pair(id: impl Into<String>, f: impl Into<FuncRef>) -> Self {
        TestEntry::Pair(id.into(), f.into())
    }
}

impl From<Func> for TestBody {
    fn from(f: Func) -> Self {
        TestBody::Func(f.into())
    }
}

impl From<TestNode> for TestBody {
    fn from(node: TestNode) -> Self {
        TestBody::Node(Box::new(node))
    }
}

impl From<Func> for TestEntry {
    fn from(f: Func) -> Self {
        TestEntry::Func(f.into())
    }
}

impl From<TestNode> for TestEntry {
    fn from(node: TestNode) -> Self {
        TestEntry::Node(node)
    }
}

impl<S: Into<String>> From<(S, Func)> for TestEntry {
    fn from((id, f): (S, Func)) -> Self {
        TestEntry::Pair(id.into(), f.into())
    }
}

impl TestNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn before(mut self, f: impl Into<FuncRef>) -> Self {
        self.before = Some(f.into());
        self
    }

    pub fn before_each(mut self, f: impl Into<FuncRef>) -> Self {
        self.before_each = Some(f.into());
        self
    }

    pub fn after(mut self, f: impl Into<FuncRef>) -> Self {
        self.after = Some(f.into());
        self
    }

    pub fn after_each(mut self, f: impl Into<FuncRef>) -> Self {
        self.after_each = Some(f.into());
        self
    }

    pub fn finally(mut self, f: impl Into<FuncRef>) -> Self {
        self.finally = Some(f.into());
        self
    }

    pub fn test(mut self, body: impl Into<TestBody>) -> Self {
        self.test = Some(body.into());
        self
    }

    pub fn tests<I, E>(mut self, tests: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<TestEntry>,
    {
        self.tests = Some(tests.into_iter().map(Into::into).collect());
        self
    }

    pub fn order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn kind(mut self, kind: TestType) -> Self {
        self.kind = kind;
        self
    }
}

/// Resolved scaffolds of a validated node
#[derive(Clone, Debug, Default)]
pub struct Hooks {
    pub before: Option<Func>,
    pub before_each: Option<Func>,
    pub after: Option<Func>,
    pub after_each: Option<Func>,
    pub finally: Option<Func>,
}

impl Hooks {
    /// Scaffold for a phase; always `None` for [`Phase::Test`]
    pub fn get(&self, phase: Phase) -> Option<&Func> {
        match phase {
            Phase::Before => self.before.as_ref(),
            Phase::BeforeEach => self.before_each.as_ref(),
            Phase::AfterEach => self.after_each.as_ref(),
            Phase::After => self.after.as_ref(),
            Phase::Finally => self.finally.as_ref(),
            Phase::Test => None,
        }
    }

    pub fn has(&self, phase: Phase) -> bool {
        self.get(phase).is_some()
    }
}

/// A validated node
#[derive(Clone, Debug)]
pub struct SuiteNode {
    pub id: String,
    pub hooks: Hooks,
    pub body: SuiteBody,
}

#[derive(Clone, Debug)]
pub enum SuiteBody {
    Test(Func),
    Node(Box<SuiteNode>),
    Nodes(Vec<SuiteNode>),
}

impl SuiteNode {
    /// A leaf without scaffolds
    pub fn leaf(id: impl Into<String>, f: Func) -> Self {
        Self {
            id: id.into(),
            hooks: Hooks::default(),
            body: SuiteBody::Test(f),
        }
    }

    /// Number of leaf tests beneath (and including) this node
    pub fn test_count(&self) -> usize {
        match &self.body {
            SuiteBody::Test(_) => 1,
            SuiteBody::Node(child) => child.test_count(),
            SuiteBody::Nodes(children) => children.iter().map(SuiteNode::test_count).sum(),
        }
    }
}

/// A validated, registered top-level tree
#[derive(Clone, Debug)]
pub struct Suite {
    pub root: SuiteNode,
    pub kind: TestType,
    pub order: Option<f64>,
}

impl Suite {
    pub fn id(&self) -> &str {
        &self.root.id
    }
}
