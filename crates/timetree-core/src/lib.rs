//! Core data model for branching simulation histories.
//!
//! This is the leaf crate of the timetree workspace. It defines the
//! simpack contract ([`Simpack`], [`State`], [`StepProfile`]), the state
//! [`Tree`] with its [`Block`] compression layer, decision-recording
//! [`Path`]s, and the [`SharedTree`] lock that serializes structural
//! mutation against concurrent readers.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod error;
pub mod history;
pub mod id;
pub mod node;
pub mod path;
pub mod search;
pub mod simpack;
pub mod tree;

pub use block::Block;
pub use error::{BlockError, HistoryError, PathError, StepError, TreeError};
pub use history::HistoryView;
pub use id::{BlockId, NodeId};
pub use node::{End, Node};
pub use path::{Path, PathItem};
pub use search::{Bracket, Rounded, Rounding};
pub use simpack::{resolve_clock, Simpack, State, StepIterator, StepKind, StepOutcome, StepProfile};
pub use tree::{SharedTree, Tree, TreeReadGuard, TreeWriteGuard};
