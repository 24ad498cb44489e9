//! Error types for crunching, organized by subsystem: configuration,
//! individual crunchers, and the synchronization pass.

use timetree_core::{PathError, StepKind, TreeError};

use crate::job::JobId;

/// Errors detected while configuring a [`CrunchingManager`](crate::manager::CrunchingManager).
///
/// These are fatal at construction and are not retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No cruncher types were installed.
    #[error("no cruncher types are installed")]
    NoCruncherTypes,
    /// Two installed cruncher types share a name.
    #[error("cruncher type '{0}' is installed more than once")]
    DuplicateCruncherType(&'static str),
    /// A cruncher type was selected by a name that is not installed.
    #[error("cruncher type '{0}' is not installed")]
    UnknownCruncherType(String),
    /// None of the installed cruncher types can run the simpack.
    #[error("no installed cruncher type can crunch simpack '{simpack}' ({kind:?} steps)")]
    NoUsableCruncher {
        /// The simpack's name.
        simpack: String,
        /// The step kind of its default profile.
        kind: StepKind,
    },
}

/// Errors raised by an individual cruncher.
#[derive(Debug, thiserror::Error)]
pub enum CrunchError {
    /// The worker thread or process could not be started.
    #[error("cruncher could not be spawned: {reason}")]
    SpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
    /// `start` was called twice.
    #[error("cruncher was already started")]
    AlreadyStarted,
    /// An in-place profile update tried to change the step profile.
    /// Workers cannot switch evaluators; replace the cruncher instead.
    #[error("crunching profile update changes the step profile")]
    StepProfileChanged,
    /// Talking to a worker process failed.
    #[error("worker i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// A message to or from a worker process could not be encoded.
    #[error("worker message encoding failed: {reason}")]
    Encoding {
        /// Description of the encoding failure.
        reason: String,
    },
}

/// Errors from [`CrunchingManager::sync_crunchers`](crate::manager::CrunchingManager::sync_crunchers)
/// and the job helpers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Committing produced states to the tree failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// A worker's output queue yielded something that is neither a state
    /// nor an end marker. The cruncher implementation is broken.
    #[error("unexpected item in the output queue of job {job}: {raw}")]
    UnexpectedItem {
        /// The job whose cruncher produced the item.
        job: JobId,
        /// The raw item, as received.
        raw: String,
    },
    /// The active cruncher type cannot run the job's step kind.
    #[error("cruncher type '{cruncher_type}' cannot run {kind:?} steps for job {job}")]
    UnsupportedStepKind {
        /// The job that could not be started.
        job: JobId,
        /// The active cruncher type.
        cruncher_type: &'static str,
        /// The job's step kind.
        kind: StepKind,
    },
    /// A cruncher failed to start or update.
    #[error("cruncher for job {job} failed: {source}")]
    Cruncher {
        /// The affected job.
        job: JobId,
        /// The underlying failure.
        #[source]
        source: CrunchError,
    },
    /// A buffer request named a node off the given path.
    #[error(transparent)]
    Path(#[from] PathError),
}
