//! Error types for the timetree core, one enum per subsystem.

use crate::id::{BlockId, NodeId};

/// Errors from structural tree operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The node id was not issued by this tree.
    #[error("node {0} does not exist in this tree")]
    UnknownNode(NodeId),
    /// An untouched child node was inserted without a step profile.
    #[error("untouched child of {parent} needs a step profile")]
    MissingStepProfile {
        /// The intended parent.
        parent: NodeId,
    },
    /// The parent is a touched node that has not been finalized yet, so it
    /// may not gain children.
    #[error("node {0} is still in editing and cannot gain children")]
    StillInEditing(NodeId),
    /// `finalize` was called on a node that is not a touched,
    /// still-in-editing node.
    #[error("node {node} cannot be finalized: {reason}")]
    InvalidState {
        /// The node that was asked to finalize.
        node: NodeId,
        /// Which precondition failed.
        reason: &'static str,
    },
    /// A block invariant would have been violated.
    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Violations of the block shape invariant.
///
/// These are programming-contract errors: the tree never produces them
/// through its public insertion API.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// A block must contain at least two nodes.
    #[error("a block needs at least 2 nodes, got {len}")]
    TooShort {
        /// The rejected length.
        len: usize,
    },
    /// `next` is not the sole child of `prev`.
    #[error("{next} is not the only child of {prev}")]
    NotConsecutive {
        /// The earlier node.
        prev: NodeId,
        /// The node expected to follow it.
        next: NodeId,
    },
    /// Two members were produced with different step profiles.
    #[error("{node} has a different step profile than the rest of the block")]
    MixedProfiles {
        /// The offending member.
        node: NodeId,
    },
    /// Touched nodes never join blocks.
    #[error("{node} is touched and cannot join a block")]
    TouchedMember {
        /// The offending member.
        node: NodeId,
    },
    /// A node that is already in a different block.
    #[error("{node} already belongs to block {block}")]
    AlreadyInBlock {
        /// The offending member.
        node: NodeId,
        /// Its current block.
        block: BlockId,
    },
    /// The node is not a member of the block.
    #[error("{node} is not a member of block {block}")]
    NotAMember {
        /// The node that was looked up.
        node: NodeId,
        /// The block searched.
        block: BlockId,
    },
    /// The block id is not live in this tree.
    #[error("block {0} does not exist in this tree")]
    UnknownBlock(BlockId),
    /// The node does not belong to any block.
    #[error("{node} is not in any block")]
    NotInAnyBlock {
        /// The node that was looked up.
        node: NodeId,
    },
    /// A member index outside `0..len`.
    #[error("index {index} is out of range for a block of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: isize,
        /// The block length.
        len: usize,
    },
}

/// Navigation failures along a [`Path`](crate::path::Path).
///
/// `OutOfRange` means "nothing that far exists yet", which callers can
/// treat as "keep polling". The `*NotReached` variants mean the anchor
/// node handed in is not on this route at all.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The index ran off either end of the path.
    #[error("index {index} is out of range for a path of length {len}")]
    OutOfRange {
        /// The requested index.
        index: isize,
        /// The number of nodes that were available.
        len: usize,
    },
    /// The tail node is not on this path (or comes before the head).
    #[error("tail node {0} was not reached on this path")]
    TailNotReached(NodeId),
    /// The head node is not on this path.
    #[error("head node {0} was not reached on this path")]
    HeadNotReached(NodeId),
    /// The path has no root.
    #[error("path is empty")]
    EmptyPath,
    /// The path refers to a node the tree does not know.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Failures reading a worker's history view.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The worker's job was retired; it should stop stepping.
    #[error("the worker reading this history is obsolete")]
    ObsoleteWorker,
    /// The index ran off either end of the timeline.
    #[error("history index {index} is out of range for length {len}")]
    OutOfRange {
        /// The requested index.
        index: isize,
        /// The timeline length at the time of the call.
        len: usize,
    },
    /// Committed history could not be navigated.
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Failures of a simpack step.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The simpack does not implement the requested step kind for this
    /// profile.
    #[error("step kind {0:?} is not supported by this simpack")]
    UnsupportedKind(crate::simpack::StepKind),
    /// A history-dependent step was driven without a history view.
    #[error("history-dependent step needs a history view")]
    MissingHistory,
    /// The simpack's own step failed.
    #[error("step failed: {reason}")]
    Failed {
        /// Human-readable description from the simpack.
        reason: String,
    },
    /// The history view refused the read.
    #[error(transparent)]
    History(#[from] HistoryError),
}
