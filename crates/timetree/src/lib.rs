//! timetree: a branching tree of simulation states with background
//! crunching workers.
//!
//! This is the facade crate re-exporting the public API of the timetree
//! sub-crates. Adding `timetree` as a single dependency is enough for
//! most users.
//!
//! # Quick start
//!
//! ```rust
//! use timetree::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! struct Counter(u64);
//! impl State for Counter {}
//!
//! struct Increment;
//! impl Simpack for Increment {
//!     type State = Counter;
//!     type Profile = u64;
//!
//!     fn name(&self) -> &str { "increment" }
//!     fn default_profile(&self) -> u64 { 1 }
//!     fn step_kind(&self, _: &u64) -> StepKind { StepKind::Simple }
//!     fn step(&self, state: &Counter, by: &u64) -> Result<StepOutcome<Counter>, StepError> {
//!         Ok(StepOutcome::State(Counter(state.0 + by)))
//!     }
//! }
//!
//! let mut tree = Tree::new();
//! let root = tree.add_state(Counter(0), None, None).unwrap();
//! let mut manager =
//!     CrunchingManager::new(Increment, SharedTree::new(tree), ManagerConfig::default()).unwrap();
//! manager.ensure_buffer(root, 5.0).unwrap();
//! while manager.jobs().next().is_some() {
//!     manager.sync_crunchers().unwrap();
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! let guard = manager.tree().read();
//! let tree = &*guard;
//! let mut path = Path::containing(tree, root).unwrap();
//! assert_eq!(path.len(tree), 6);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`tree`] | `timetree-core` | Nodes, blocks, paths, the tree and the simpack contract |
//! | [`crunch`] | `timetree-crunch` | Crunching profiles, jobs, crunchers and the manager |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Tree, blocks, paths and the simpack contract (`timetree-core`).
///
/// The [`tree::Tree`] stores every state; a [`tree::Path`] picks one
/// timeline through its forks.
pub use timetree_core as tree;

/// Background crunching (`timetree-crunch`).
///
/// [`crunch::CrunchingManager`] owns the jobs and keeps one cruncher per
/// job alive, installing produced states on every
/// [`sync_crunchers`](crunch::CrunchingManager::sync_crunchers) call.
pub use timetree_crunch as crunch;

/// Common imports for typical timetree usage.
///
/// ```rust
/// use timetree::prelude::*;
/// ```
pub mod prelude {
    // Tree structure
    pub use timetree_core::{BlockId, Node, NodeId, Path, SharedTree, Tree};

    // Simpack contract
    pub use timetree_core::{
        HistoryView, Rounded, Rounding, Simpack, State, StepIterator, StepKind, StepOutcome,
    };

    // Errors
    pub use timetree_core::{HistoryError, PathError, StepError, TreeError};
    pub use timetree_crunch::{ConfigError, CrunchError, SyncError};

    // Crunching
    pub use timetree_crunch::{
        CrunchingManager, CrunchingProfile, Job, JobId, ManagerConfig, ThreadCruncherType,
    };

    #[cfg(feature = "process")]
    pub use timetree_crunch::{serve_stdio, ProcessConfig, ProcessCruncherType};
}
