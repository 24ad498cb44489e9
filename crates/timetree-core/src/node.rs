//! A single simulation state plus its tree linkage.

use smallvec::SmallVec;

use crate::id::{BlockId, NodeId};

/// Marker meaning "the simulation terminates here".
#[derive(Clone, Debug, PartialEq)]
pub struct End<P> {
    /// The step profile that produced the end, if known.
    pub step_profile: Option<P>,
}

/// A node in a [`Tree`](crate::tree::Tree).
///
/// Linkage fields are arena handles owned by the tree: a node never owns
/// its parent or its block. Nodes are created and linked only by the tree.
#[derive(Clone, Debug)]
pub struct Node<S, P> {
    pub(crate) id: NodeId,
    pub(crate) state: S,
    pub(crate) clock: f64,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 2]>,
    pub(crate) derived: Vec<NodeId>,
    pub(crate) template: Option<NodeId>,
    pub(crate) block: Option<BlockId>,
    pub(crate) touched: bool,
    pub(crate) still_in_editing: bool,
    pub(crate) step_profile: Option<P>,
    pub(crate) ends: Vec<End<P>>,
}

impl<S, P> Node<S, P> {
    /// This node's handle.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The simulation state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The resolved clock: the state's own clock, or the one synthesized
    /// at insertion.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// The parent node, `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Whether this node is a root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node has more than one child.
    pub fn is_fork(&self) -> bool {
        self.children.len() > 1
    }

    /// Nodes forked-to-edit from this one (siblings, not children).
    pub fn derived_nodes(&self) -> &[NodeId] {
        &self.derived
    }

    /// The node this one was forked-to-edit from, if any.
    pub fn template(&self) -> Option<NodeId> {
        self.template
    }

    /// The block this node currently belongs to.
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// Whether this node was created by an edit rather than by stepping.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Whether this touched node is still being edited. Such a node may
    /// not be stepped from and may not gain children.
    pub fn is_still_in_editing(&self) -> bool {
        self.still_in_editing
    }

    /// The step profile that produced this state.
    pub fn step_profile(&self) -> Option<&P> {
        self.step_profile.as_ref()
    }

    /// End markers attached here.
    pub fn ends(&self) -> &[End<P>] {
        &self.ends
    }

    /// Whether the simulation ends at this node.
    pub fn has_end(&self) -> bool {
        !self.ends.is_empty()
    }

    /// Whether this node may be part of a block at all.
    pub(crate) fn blockable(&self) -> bool {
        !self.touched && self.step_profile.is_some()
    }
}
