//! Work stream
//!
//! Linearizes a [`PreparedTree`] into scheduling events. The traversal is
//! an explicit stack of frames, one per node on the current ancestor chain,
//! each holding the step it resumes from. [`WorkStream::next_event`] runs
//! the machine until it has an event to hand out, so flags set by the
//! engine between two calls (one-shot completion, abort) are observed by
//! the very next step, exactly as a lazily evaluated traversal would.

use std::sync::Arc;

use crate::filter::{NodeId, PreparedBody, PreparedTree};
use crate::func::Func;
use crate::reporter::Reporter;
use crate::types::Phase;
use crate::{Error, Result};

/// Per-run mutable state of one prepared node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub abort: bool,
    /// At least one leaf beneath ran since the last reset
    pub executed: bool,
    pub before_done: bool,
    pub before_each_done: bool,
}

/// One scheduled call
#[derive(Debug, Clone)]
pub struct Event {
    pub phase: Phase,
    /// Node whose hook or test is called
    pub node: NodeId,
    /// Position of `node` in `context`
    pub depth: usize,
    /// Ancestor chain from the root to the node being traversed
    pub context: Vec<NodeId>,
    pub func: Func,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Enter,
    NextChild { index: usize, any: bool },
    AfterChild { index: usize, any: bool },
    GroupAfter { any: bool },
    SingleAfterEach,
    SingleAfter,
    Before { index: usize },
    BeforeEach { index: usize },
    Test,
    LeafAfterEach,
    LeafAfter,
    Finally,
    Exit,
}

#[derive(Debug)]
struct Frame {
    node: NodeId,
    step: Step,
}

/// Single-pass event source over one prepared tree
pub struct WorkStream {
    tree: PreparedTree,
    state: Vec<RunState>,
    frames: Vec<Frame>,
    reporter: Arc<Reporter>,
}

impl WorkStream {
    pub fn new(tree: PreparedTree, reporter: Arc<Reporter>) -> Self {
        let frames = vec![Frame {
            node: tree.root(),
            step: Step::Enter,
        }];
        Self {
            state: vec![RunState::default(); tree.len()],
            tree,
            frames,
            reporter,
        }
    }

    pub fn tree(&self) -> &PreparedTree {
        &self.tree
    }

    pub fn state(&self, node: NodeId) -> Result<RunState> {
        self.state
            .get(node.index())
            .copied()
            .ok_or(Error::UnknownNode(node.index()))
    }

    /// Record that a one-shot hook completed successfully.
    pub fn mark_done(&mut self, node: NodeId, phase: Phase) -> Result<()> {
        let state = slot(&mut self.state, node)?;
        match phase {
            Phase::Before => state.before_done = true,
            Phase::BeforeEach => state.before_each_done = true,
            _ => {}
        }
        Ok(())
    }

    /// Abort `context[from..]`.
    pub fn abort_from(&mut self, context: &[NodeId], from: usize) -> Result<()> {
        for node in context.iter().skip(from) {
            slot(&mut self.state, *node)?.abort = true;
        }
        Ok(())
    }

    /// Abort the whole ancestor chain.
    pub fn abort_all(&mut self, context: &[NodeId]) -> Result<()> {
        self.abort_from(context, 0)
    }

    /// Ids along `context`
    pub fn names(&self, context: &[NodeId]) -> Result<Vec<String>> {
        context
            .iter()
            .map(|node| self.tree.get(*node).map(|n| n.id.clone()))
            .collect()
    }

    fn context(&self) -> Vec<NodeId> {
        self.frames.iter().map(|f| f.node).collect()
    }

    fn event(&self, phase: Phase, depth: usize) -> Result<Option<Event>> {
        let context = self.context();
        let node = context[depth];
        let prepared = self.tree.get(node)?;
        let func = match (phase, &prepared.body) {
            (Phase::Test, PreparedBody::Test(f)) => f.clone(),
            (Phase::Test, _) => {
                return Err(Error::Internal(format!("test event for non-leaf node {}", prepared.id)))
            }
            _ => prepared
                .hooks
                .get(phase)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("{} event without a hook on {}", phase, prepared.id)))?,
        };
        Ok(Some(Event {
            phase,
            node,
            depth,
            context,
            func,
        }))
    }

    /// Advance to the next event; `Ok(None)` once the tree is exhausted.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            let Some(top) = self.frames.len().checked_sub(1) else {
                return Ok(None);
            };
            let node_id = self.frames[top].node;
            let step = self.frames[top].step;
            let node = self.tree.get(node_id)?;
            let state = self.state(node_id)?;

            match step {
                Step::Enter => match &node.body {
                    PreparedBody::Children(_) => {
                        self.frames[top].step = Step::NextChild { index: 0, any: false };
                    }
                    PreparedBody::Child(child) => {
                        let child = *child;
                        self.frames[top].step = Step::SingleAfterEach;
                        self.frames.push(Frame {
                            node: child,
                            step: Step::Enter,
                        });
                    }
                    PreparedBody::Excluded => {
                        let names = self.names(&self.context())?;
                        self.reporter.exclude_test(&names);
                        self.frames[top].step = Step::Exit;
                    }
                    PreparedBody::Test(_) => {
                        for ancestor in self.context() {
                            slot(&mut self.state, ancestor)?.executed = true;
                        }
                        self.frames[top].step = Step::Before { index: 0 };
                    }
                },

                Step::NextChild { index, any } => {
                    let child = match &node.body {
                        PreparedBody::Children(children) if !state.abort => children.get(index).copied(),
                        _ => None,
                    };
                    match child {
                        Some(child) => {
                            let parent = slot(&mut self.state, node_id)?;
                            parent.before_each_done = false;
                            parent.executed = false;
                            self.frames[top].step = Step::AfterChild { index, any };
                            self.frames.push(Frame {
                                node: child,
                                step: Step::Enter,
                            });
                        }
                        None => self.frames[top].step = Step::GroupAfter { any },
                    }
                }

                Step::AfterChild { index, any } => {
                    self.frames[top].step = Step::NextChild {
                        index: index + 1,
                        any: any || state.executed,
                    };
                    if state.executed && !state.abort && node.hooks.has(Phase::AfterEach) {
                        return self.event(Phase::AfterEach, top);
                    }
                }

                Step::GroupAfter { any } => {
                    self.frames[top].step = Step::Finally;
                    if any && !state.abort && node.hooks.has(Phase::After) {
                        return self.event(Phase::After, top);
                    }
                }

                Step::SingleAfterEach => {
                    self.frames[top].step = Step::SingleAfter;
                    if state.executed && !state.abort && node.hooks.has(Phase::AfterEach) {
                        return self.event(Phase::AfterEach, top);
                    }
                }

                Step::SingleAfter => {
                    self.frames[top].step = Step::Finally;
                    if state.executed && !state.abort && node.hooks.has(Phase::After) {
                        return self.event(Phase::After, top);
                    }
                }

                Step::Before { index } | Step::BeforeEach { index } => {
                    let phase = match step {
                        Step::Before { .. } => Phase::Before,
                        _ => Phase::BeforeEach,
                    };
                    match self.pending_one_shot(phase, index)? {
                        Some(depth) => {
                            self.frames[top].step = match phase {
                                Phase::Before => Step::Before { index: depth + 1 },
                                _ => Step::BeforeEach { index: depth + 1 },
                            };
                            return self.event(phase, depth);
                        }
                        None => {
                            self.frames[top].step = match phase {
                                Phase::Before => Step::BeforeEach { index: 0 },
                                _ => Step::Test,
                            };
                        }
                    }
                }

                Step::Test => {
                    self.frames[top].step = Step::LeafAfterEach;
                    if !state.abort {
                        return self.event(Phase::Test, top);
                    }
                }

                Step::LeafAfterEach => {
                    self.frames[top].step = Step::LeafAfter;
                    if !state.abort && node.hooks.has(Phase::AfterEach) {
                        return self.event(Phase::AfterEach, top);
                    }
                }

                Step::LeafAfter => {
                    self.frames[top].step = Step::Finally;
                    if !state.abort && node.hooks.has(Phase::After) {
                        return self.event(Phase::After, top);
                    }
                }

                Step::Finally => {
                    self.frames[top].step = Step::Exit;
                    if node.hooks.has(Phase::Finally) {
                        return self.event(Phase::Finally, top);
                    }
                }

                Step::Exit => {
                    self.frames.pop();
                }
            }
        }
    }

    /// First ancestor at or after `from` with an unfired, unaborted one-shot hook
    fn pending_one_shot(&self, phase: Phase, from: usize) -> Result<Option<usize>> {
        for (depth, frame) in self.frames.iter().enumerate().skip(from) {
            let state = self.state(frame.node)?;
            let done = match phase {
                Phase::Before => state.before_done,
                _ => state.before_each_done,
            };
            if !done && !state.abort && self.tree.get(frame.node)?.hooks.has(phase) {
                return Ok(Some(depth));
            }
        }
        Ok(None)
    }
}

fn slot(state: &mut [RunState], node: NodeId) -> Result<&mut RunState> {
    state.get_mut(node.index()).ok_or(Error::UnknownNode(node.index()))
}

impl std::fmt::Debug for WorkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkStream")
            .field("nodes", &self.tree.len())
            .field("frames", &self.frames)
            .finish()
    }
}
