//! Strongly-typed handles into a [`Tree`](crate::tree::Tree)'s arenas.

use std::fmt;

/// Identifies a node within a tree.
///
/// Nodes are appended to the tree's arena and never move, so `NodeId(n)`
/// is the n-th node ever inserted. A `NodeId` is only meaningful for the
/// tree that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a block within a tree.
///
/// Block slots are recycled after a block dissolves, so a `BlockId`
/// read from a node is only valid until the next structural mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}
