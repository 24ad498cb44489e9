//! The tree of simulation states and its reader/writer lock.
//!
//! [`Tree`] owns every committed [`Node`] in an append-only arena and the
//! [`Block`]s layered over them. [`SharedTree`] is the handle shared
//! between the coordinator and background readers: structural writes
//! take the write lock for their full duration, and any multi-step read
//! that needs one consistent shape takes the read lock.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use slab::Slab;
use smallvec::SmallVec;

use crate::block::Block;
use crate::error::TreeError;
use crate::id::{BlockId, NodeId};
use crate::node::{End, Node};
use crate::simpack::{resolve_clock, State, StepProfile};

// ── Tree ────────────────────────────────────────────────────────

/// A forking history of simulation states.
#[derive(Clone, Debug)]
pub struct Tree<S, P> {
    pub(crate) nodes: Vec<Node<S, P>>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) blocks: Slab<Block>,
}

impl<S, P> Default for Tree<S, P> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            blocks: Slab::new(),
        }
    }
}

impl<S, P> Tree<S, P> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root nodes in creation order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node.
    pub fn get(&self, id: NodeId) -> Option<&Node<S, P>> {
        self.nodes.get(id.index())
    }

    /// Look up a node, failing for ids this tree did not issue.
    pub fn node(&self, id: NodeId) -> Result<&Node<S, P>, TreeError> {
        self.get(id).ok_or(TreeError::UnknownNode(id))
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<S, P>> {
        self.nodes.iter()
    }

    /// Look up a live block.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// All live blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().map(|(_, block)| block)
    }

    /// Every node without children.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|n| n.is_leaf()).map(|n| n.id)
    }

    /// Ancestors of `node`, nearest first, excluding `node` itself.
    pub fn ancestors(&self, node: NodeId) -> Result<Ancestors<'_, S, P>, TreeError> {
        let start = self.node(node)?;
        Ok(Ancestors {
            tree: self,
            next: start.parent,
        })
    }

    /// Number of ancestors of `node`; roots have depth 0.
    pub fn depth(&self, node: NodeId) -> Result<usize, TreeError> {
        let mut depth = 0;
        let mut current = self.node(node)?;
        while let Some(parent) = current.parent {
            current = &self.nodes[parent.index()];
            // Inside a block every ancestor up to the head is a member.
            if let Some(block) = current.block {
                let block = &self.blocks[block.index()];
                if let Ok(pos) = block.index_of(current.id) {
                    depth += pos;
                    current = &self.nodes[block.head().index()];
                }
            }
            depth += 1;
        }
        Ok(depth)
    }

    /// The root `node` descends from.
    pub fn root_of(&self, node: NodeId) -> Result<NodeId, TreeError> {
        let mut current = self.node(node)?;
        while let Some(parent) = current.parent {
            current = &self.nodes[parent.index()];
        }
        Ok(current.id)
    }

    /// Leaves reachable from `node` (including `node` if it is one) whose
    /// clock is at most `max_clock_distance` past `node`'s.
    pub fn all_leaves(
        &self,
        node: NodeId,
        max_clock_distance: Option<f64>,
    ) -> Result<Vec<NodeId>, TreeError> {
        let origin = self.node(node)?.clock;
        let limit = max_clock_distance.map(|d| origin + d);
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let current = &self.nodes[id.index()];
            if current.children.is_empty() {
                if limit.is_none_or(|limit| current.clock <= limit) {
                    leaves.push(id);
                }
                continue;
            }
            stack.extend(current.children.iter().rev().copied());
        }
        Ok(leaves)
    }

    fn push_node(&mut self, node: Node<S, P>) -> NodeId {
        let id = node.id;
        if node.parent.is_none() {
            self.roots.push(id);
        }
        self.nodes.push(node);
        id
    }

    fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len() as u32)
    }

    fn editable_parent(&self, parent: NodeId) -> Result<&Node<S, P>, TreeError> {
        let node = self.node(parent)?;
        if node.still_in_editing {
            return Err(TreeError::StillInEditing(parent));
        }
        Ok(node)
    }
}

impl<S: State, P: StepProfile> Tree<S, P> {
    /// Insert a stepped (untouched) state.
    ///
    /// With no `parent`, the node becomes an untouched root; its clock
    /// defaults to 0 when the state has none. Under a `parent` the step
    /// profile is required and the clock defaults to `parent + 1`. Block
    /// membership is re-evaluated after linking.
    pub fn add_state(
        &mut self,
        state: S,
        parent: Option<NodeId>,
        step_profile: Option<P>,
    ) -> Result<NodeId, TreeError> {
        let parent_clock = match parent {
            Some(p) => {
                let parent_node = self.editable_parent(p)?;
                if step_profile.is_none() {
                    return Err(TreeError::MissingStepProfile { parent: p });
                }
                Some(parent_node.clock)
            }
            None => None,
        };
        let clock = resolve_clock(&state, parent_clock);
        let id = self.next_id();
        self.push_node(Node {
            id,
            state,
            clock,
            parent,
            children: SmallVec::new(),
            derived: Vec::new(),
            template: None,
            block: None,
            touched: false,
            still_in_editing: false,
            step_profile,
            ends: Vec::new(),
        });
        if let Some(p) = parent {
            self.link_child(p, id)?;
        }
        Ok(id)
    }

    /// Insert an edit-created (touched) state, e.g. a from-scratch root.
    ///
    /// A node created `still_in_editing` must be [finalized](Tree::finalize)
    /// before it can be stepped from or gain children.
    pub fn add_touched_state(
        &mut self,
        state: S,
        parent: Option<NodeId>,
        still_in_editing: bool,
    ) -> Result<NodeId, TreeError> {
        let parent_clock = match parent {
            Some(p) => Some(self.editable_parent(p)?.clock),
            None => None,
        };
        let clock = resolve_clock(&state, parent_clock);
        let id = self.next_id();
        self.push_node(Node {
            id,
            state,
            clock,
            parent,
            children: SmallVec::new(),
            derived: Vec::new(),
            template: None,
            block: None,
            touched: true,
            still_in_editing,
            step_profile: None,
            ends: Vec::new(),
        });
        if let Some(p) = parent {
            self.link_child(p, id)?;
        }
        Ok(id)
    }

    /// Copy `template`'s state into a new touched, still-in-editing
    /// sibling of it.
    ///
    /// The copy hangs off `template`'s parent (or becomes a root) and is
    /// recorded as derived from `template`; it is not a child of it.
    pub fn fork_to_edit(&mut self, template: NodeId) -> Result<NodeId, TreeError> {
        let source = self.node(template)?;
        let (state, clock, parent) = (source.state.clone(), source.clock, source.parent);
        if let Some(p) = parent {
            self.editable_parent(p)?;
        }
        let id = self.next_id();
        self.push_node(Node {
            id,
            state,
            clock,
            parent,
            children: SmallVec::new(),
            derived: Vec::new(),
            template: Some(template),
            block: None,
            touched: true,
            still_in_editing: true,
            step_profile: None,
            ends: Vec::new(),
        });
        self.nodes[template.index()].derived.push(id);
        if let Some(p) = parent {
            self.link_child(p, id)?;
        }
        Ok(id)
    }

    /// Finish editing a touched node so it can be stepped from.
    pub fn finalize(&mut self, node: NodeId) -> Result<(), TreeError> {
        let target = self.nodes.get_mut(node.index()).ok_or(TreeError::UnknownNode(node))?;
        if !target.touched {
            return Err(TreeError::InvalidState {
                node,
                reason: "untouched nodes are never in editing",
            });
        }
        if !target.still_in_editing {
            return Err(TreeError::InvalidState {
                node,
                reason: "already finalized",
            });
        }
        target.still_in_editing = false;
        Ok(())
    }

    /// Mark the simulation as ending at `node`.
    pub fn add_end(&mut self, node: NodeId, step_profile: Option<P>) -> Result<(), TreeError> {
        let target = self.nodes.get_mut(node.index()).ok_or(TreeError::UnknownNode(node))?;
        target.ends.push(End { step_profile });
        tracing::debug!(%node, ends = target.ends.len(), "end recorded");
        Ok(())
    }

    fn link_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.nodes[parent.index()].children.push(child);
        self.on_child_linked(parent, child)?;
        Ok(())
    }
}

/// Iterator over a node's ancestors, nearest first.
pub struct Ancestors<'a, S, P> {
    tree: &'a Tree<S, P>,
    next: Option<NodeId>,
}

impl<S, P> Iterator for Ancestors<'_, S, P> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.nodes[id.index()].parent;
        Some(id)
    }
}

// ── SharedTree ──────────────────────────────────────────────────

/// Read guard over a shared tree.
pub type TreeReadGuard<'a, S, P> = RwLockReadGuard<'a, Tree<S, P>>;
/// Write guard over a shared tree.
pub type TreeWriteGuard<'a, S, P> = RwLockWriteGuard<'a, Tree<S, P>>;

/// A tree behind a reader/writer lock, cheap to clone and share with
/// worker threads.
pub struct SharedTree<S, P> {
    inner: Arc<RwLock<Tree<S, P>>>,
}

impl<S, P> Clone for SharedTree<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P> SharedTree<S, P> {
    /// Share `tree`.
    pub fn new(tree: Tree<S, P>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Acquire the read lock, blocking while a writer holds it.
    pub fn read(&self) -> TreeReadGuard<'_, S, P> {
        self.inner.read()
    }

    /// Acquire the write lock, blocking until all readers are gone.
    pub fn write(&self) -> TreeWriteGuard<'_, S, P> {
        self.inner.write()
    }
}

impl<S, P> Default for SharedTree<S, P> {
    fn default() -> Self {
        Self::new(Tree::new())
    }
}

// Compile-time assertion: SharedTree must be Send + Sync for thread-safe
// payloads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SharedTree<u64, u8>>();
};
