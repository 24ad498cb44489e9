//! Background crunching for timetree simulations.
//!
//! A [`CrunchingManager`] keeps one [`Cruncher`] per live [`Job`] and,
//! each time the embedding application calls
//! [`sync_crunchers`](CrunchingManager::sync_crunchers), commits their
//! output into the shared tree. Crunchers run on threads
//! ([`ThreadCruncherType`]) or, with the `process` feature, in worker
//! processes (`ProcessCruncherType`).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod cruncher;
pub mod error;
pub mod history;
pub mod job;
pub mod manager;
#[cfg(feature = "process")]
pub mod process;
pub mod profile;
pub mod queue;
pub mod stepper;
pub mod thread;

pub use config::ManagerConfig;
pub use cruncher::{Cruncher, CruncherSetup, CruncherType, StepKindCache};
pub use error::{ConfigError, CrunchError, SyncError};
pub use history::HistoryBrowser;
pub use job::{Job, JobId};
pub use manager::CrunchingManager;
#[cfg(feature = "process")]
pub use process::{
    serve, serve_stdio, ProcessConfig, ProcessCruncher, ProcessCruncherType, WireProfile,
    WorkerCommand, WorkerEvent, PROCESS_CRUNCHER,
};
pub use profile::CrunchingProfile;
pub use queue::{Assignment, CrunchItem, OutputQueue};
pub use stepper::Stepper;
pub use thread::{ThreadCruncher, ThreadCruncherType, THREAD_CRUNCHER};
