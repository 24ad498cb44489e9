//! The cruncher contract and the factories the manager picks from.

use std::sync::Arc;

use timetree_core::{SharedTree, Simpack, StepKind, StepProfile};

use crate::error::CrunchError;
use crate::profile::CrunchingProfile;
use crate::queue::{Assignment, OutputQueue};

/// A background producer of states for one job.
///
/// A cruncher is built once with a fixed starting state and a snapshot
/// of the job's crunching profile. It never touches the tree; its output
/// goes to [`output`](Cruncher::output) and only the manager commits it.
pub trait Cruncher<Sp: Simpack>: Send {
    /// Begin producing.
    fn start(&mut self) -> Result<(), CrunchError>;

    /// Ask the worker to stop. Safe to call repeatedly and on a worker
    /// that already died; the worker may stay alive for a short while.
    fn retire(&mut self);

    /// Push a new crunching profile to the running worker.
    ///
    /// Fails with [`CrunchError::StepProfileChanged`] if `profile` has a
    /// different step profile from the one the worker was built with.
    fn update_crunching_profile(
        &mut self,
        profile: CrunchingProfile<Sp::Profile>,
    ) -> Result<(), CrunchError>;

    /// Best-effort liveness.
    fn is_alive(&self) -> bool;

    /// The queue this cruncher produces into.
    fn output(&self) -> &OutputQueue<Sp::State>;
}

/// Everything a cruncher needs to be built.
pub struct CruncherSetup<Sp: Simpack> {
    /// The simulation package.
    pub simpack: Arc<Sp>,
    /// The tree, for history-dependent steps.
    pub tree: SharedTree<Sp::State, Sp::Profile>,
    /// The state to crunch from.
    pub state: Sp::State,
    /// That state's resolved clock.
    pub clock: f64,
    /// Snapshot of the job's profile.
    pub crunching_profile: CrunchingProfile<Sp::Profile>,
    /// Classification of the step profile.
    pub step_kind: StepKind,
    /// Where the job has been committed up to.
    pub assignment: Arc<Assignment>,
    /// Where output goes.
    pub output: OutputQueue<Sp::State>,
}

/// A named kind of cruncher, installable into a
/// [`ManagerConfig`](crate::config::ManagerConfig).
pub trait CruncherType<Sp: Simpack>: Send + Sync {
    /// Unique name, used to select the type at runtime.
    fn name(&self) -> &'static str;

    /// Whether crunchers of this type can run `kind` steps.
    fn can_crunch(&self, kind: StepKind) -> bool;

    /// Build an unstarted cruncher.
    fn create(&self, setup: CruncherSetup<Sp>) -> Result<Box<dyn Cruncher<Sp>>, CrunchError>;
}

// ── StepKindCache ───────────────────────────────────────────────

/// Memoized [`Simpack::step_kind`] lookups.
///
/// Keyed by step-profile equality with a linear scan; profiles are never
/// hashed. Owned by the component that classifies profiles, so entries
/// live exactly as long as it does.
#[derive(Clone, Debug)]
pub struct StepKindCache<P> {
    entries: Vec<(P, StepKind)>,
}

impl<P> Default for StepKindCache<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P: StepProfile> StepKindCache<P> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `profile`, asking `simpack` only on a miss.
    pub fn kind<Sp>(&mut self, simpack: &Sp, profile: &P) -> StepKind
    where
        Sp: Simpack<Profile = P>,
    {
        if let Some((_, kind)) = self.entries.iter().find(|(cached, _)| cached == profile) {
            return *kind;
        }
        let kind = simpack.step_kind(profile);
        self.entries.push((profile.clone(), kind));
        kind
    }

    /// Number of distinct profiles classified so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been classified yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
