//! Inclusion filtering
//!
//! Produces the per-run [`PreparedTree`] for a validated suite. The tree is
//! an arena indexed by [`NodeId`]; the work stream keeps its run state in a
//! side table keyed by the same ids, so the authored suite stays untouched
//! and reusable.
//!
//! Include paths are matched level by level. Each path remembers the
//! deepest level it has matched along the current ancestor chain; at a new
//! level only paths that matched the parent are compared against the node.
//! A path ending exactly at a node includes the whole subtree beneath it
//! ("exact"); a path with segments left over includes the node but keeps
//! filtering its children ("partial"). Exact wins when both apply.

use tracing::debug;

use crate::func::Func;
use crate::reporter::{category, Entry, Reporter};
use crate::spec::{Hooks, Suite, SuiteBody, SuiteNode};
use crate::{Error, Result};

/// Index of a node in a [`PreparedTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct PreparedNode {
    pub id: String,
    pub hooks: Hooks,
    pub body: PreparedBody,
}

#[derive(Clone, Debug)]
pub enum PreparedBody {
    Test(Func),
    /// Excluded by the include filter; never runs, hooks are dropped
    Excluded,
    Child(NodeId),
    Children(Vec<NodeId>),
}

/// A per-run copy of a suite
#[derive(Clone, Debug)]
pub struct PreparedTree {
    nodes: Vec<PreparedNode>,
    root: NodeId,
}

impl PreparedTree {
    /// Copy a validated tree without pruning.
    pub fn new(root: &SuiteNode) -> Self {
        let mut builder = Builder { nodes: Vec::new() };
        let root = builder.copy(root);
        builder.finish(root)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Result<&PreparedNode> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id.0))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every leaf, in execution order, paired with whether it is excluded
    pub fn leaves(&self) -> Result<Vec<(Vec<String>, bool)>> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.collect_leaves(self.root, &mut path, &mut out)?;
        Ok(out)
    }

    fn collect_leaves(
        &self,
        id: NodeId,
        path: &mut Vec<String>,
        out: &mut Vec<(Vec<String>, bool)>,
    ) -> Result<()> {
        let node = self.get(id)?;
        path.push(node.id.clone());
        match &node.body {
            PreparedBody::Test(_) => out.push((path.clone(), false)),
            PreparedBody::Excluded => out.push((path.clone(), true)),
            PreparedBody::Child(child) => self.collect_leaves(*child, path, out)?,
            PreparedBody::Children(children) => {
                for child in children {
                    self.collect_leaves(*child, path, out)?;
                }
            }
        }
        path.pop();
        Ok(())
    }
}

/// Result of filtering one suite
#[derive(Debug)]
pub struct Filtered {
    /// `None` when the include paths matched nothing in this suite
    pub tree: Option<PreparedTree>,
    /// Set when the include paths were malformed; the tree is then an
    /// excluded root sentinel
    pub error: bool,
}

/// Prune `suite` according to `include`.
///
/// An empty include list copies the tree unchanged.
pub fn filter(suite: &Suite, include: &[Vec<String>], reporter: &Reporter) -> Filtered {
    if include.is_empty() {
        return Filtered {
            tree: Some(PreparedTree::new(&suite.root)),
            error: false,
        };
    }

    if let Err(err) = check_include(include) {
        reporter.log(
            category::BAD_INCLUDE,
            None,
            vec![Entry::from(suite.id()), Entry::from(err.to_string())],
            false,
        );
        let mut builder = Builder { nodes: Vec::new() };
        let root = builder.excluded(&suite.root);
        return Filtered {
            tree: Some(builder.finish(root)),
            error: true,
        };
    }

    let mut matcher = Matcher {
        include,
        matched: vec![None; include.len()],
    };
    let mut builder = Builder { nodes: Vec::new() };

    let tree = matcher.includes(&suite.root.id, 0).map(|inclusion| {
        let root = builder.filtered(&suite.root, inclusion, 0, &mut matcher);
        builder.finish(root)
    });

    if tree.is_none() {
        debug!("Include paths matched nothing in {}", suite.id());
        reporter.log(
            category::INFO,
            None,
            vec![
                Entry::from(suite.id()),
                Entry::from("either no tests or includes did not match any tests"),
            ],
            false,
        );
    }

    Filtered { tree, error: false }
}

fn check_include(include: &[Vec<String>]) -> Result<()> {
    for (index, path) in include.iter().enumerate() {
        if path.is_empty() {
            return Err(Error::InvalidInclude {
                index,
                reason: "empty path".to_string(),
            });
        }
        if let Some(position) = path.iter().position(|s| s.is_empty()) {
            return Err(Error::InvalidInclude {
                index,
                reason: format!("empty segment at position {}", position),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inclusion {
    Partial,
    Exact,
}

struct Matcher<'a> {
    include: &'a [Vec<String>],
    /// Deepest level each path has matched along the current chain
    matched: Vec<Option<usize>>,
}

impl Matcher<'_> {
    fn includes(&mut self, id: &str, level: usize) -> Option<Inclusion> {
        let mut result = None;
        for (path, matched) in self.include.iter().zip(self.matched.iter_mut()) {
            let extends_parent = match level {
                0 => matched.is_none(),
                _ => *matched == Some(level - 1),
            };
            if !extends_parent || path.get(level).map(String::as_str) != Some(id) {
                continue;
            }
            *matched = Some(level);
            if path.len() == level + 1 {
                result = Some(Inclusion::Exact);
            } else if result.is_none() {
                result = Some(Inclusion::Partial);
            }
        }
        result
    }
}

struct Builder {
    nodes: Vec<PreparedNode>,
}

impl Builder {
    fn push(&mut self, node: PreparedNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn finish(self, root: NodeId) -> PreparedTree {
        PreparedTree {
            nodes: self.nodes,
            root,
        }
    }

    fn excluded(&mut self, node: &SuiteNode) -> NodeId {
        self.push(PreparedNode {
            id: node.id.clone(),
            hooks: Hooks::default(),
            body: PreparedBody::Excluded,
        })
    }

    fn copy(&mut self, node: &SuiteNode) -> NodeId {
        let body = match &node.body {
            SuiteBody::Test(f) => PreparedBody::Test(f.clone()),
            SuiteBody::Node(child) => PreparedBody::Child(self.copy(child)),
            SuiteBody::Nodes(children) => PreparedBody::Children(children.iter().map(|c| self.copy(c)).collect()),
        };
        self.push(PreparedNode {
            id: node.id.clone(),
            hooks: node.hooks.clone(),
            body,
        })
    }

    fn filtered(&mut self, node: &SuiteNode, inclusion: Inclusion, level: usize, matcher: &mut Matcher) -> NodeId {
        if inclusion == Inclusion::Exact {
            return self.copy(node);
        }

        let body = match &node.body {
            // the include path continues below a leaf, so it names nothing here
            SuiteBody::Test(_) => return self.excluded(node),
            SuiteBody::Node(child) => PreparedBody::Child(self.child(child, level + 1, matcher)),
            SuiteBody::Nodes(children) => {
                PreparedBody::Children(children.iter().map(|c| self.child(c, level + 1, matcher)).collect())
            }
        };
        self.push(PreparedNode {
            id: node.id.clone(),
            hooks: node.hooks.clone(),
            body,
        })
    }

    fn child(&mut self, node: &SuiteNode, level: usize, matcher: &mut Matcher) -> NodeId {
        let saved = matcher.matched.clone();
        let id = match matcher.includes(&node.id, level) {
            Some(inclusion) => self.filtered(node, inclusion, level, matcher),
            None => self.excluded(node),
        };
        matcher.matched = saved;
        id
    }
}
