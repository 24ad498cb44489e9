//! The crunching manager: keeps one cruncher per live job and commits
//! their output into the tree.
//!
//! All coordinator-side mutation happens inside
//! [`sync_crunchers`](CrunchingManager::sync_crunchers), which the
//! embedding application calls from its poll loop. A pass holds the
//! tree's write lock throughout and never waits on a worker.

use std::sync::Arc;

use indexmap::IndexMap;
use timetree_core::{NodeId, Path, PathError, SharedTree, Simpack, Tree};
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::cruncher::{Cruncher, CruncherSetup, StepKindCache};
use crate::error::{ConfigError, SyncError};
use crate::job::{Job, JobId};
use crate::profile::CrunchingProfile;
use crate::queue::{Assignment, CrunchItem, OutputQueue};

type SimTree<Sp> = Tree<<Sp as Simpack>::State, <Sp as Simpack>::Profile>;

// ── CruncherEntry ───────────────────────────────────────────────

/// Bookkeeping for one running cruncher.
struct CruncherEntry<Sp: Simpack> {
    cruncher: Box<dyn Cruncher<Sp>>,
    assignment: Arc<Assignment>,
    cruncher_type: &'static str,
    /// The profile the worker is running. Its step profile is the one
    /// committed nodes are tagged with.
    sent: CrunchingProfile<Sp::Profile>,
    /// Newest committed node of this cruncher's output.
    node: NodeId,
}

#[derive(Default)]
struct Drained {
    added: usize,
    ended: bool,
}

impl<Sp: Simpack> CruncherEntry<Sp> {
    /// Commit everything available right now, in production order.
    fn drain(&mut self, tree: &mut SimTree<Sp>, job: JobId) -> Result<Drained, SyncError> {
        let mut drained = Drained::default();
        for item in self.cruncher.output().take_available() {
            match item {
                CrunchItem::State { state, .. } => {
                    self.node =
                        tree.add_state(state, Some(self.node), Some(self.sent.step_profile.clone()))?;
                    drained.added += 1;
                }
                CrunchItem::End => {
                    tree.add_end(self.node, Some(self.sent.step_profile.clone()))?;
                    drained.ended = true;
                }
                CrunchItem::Unrecognized(raw) => {
                    self.assignment.assign(self.node);
                    return Err(SyncError::UnexpectedItem { job, raw });
                }
            }
        }
        self.assignment.assign(self.node);
        Ok(drained)
    }

    fn retire(&mut self) {
        self.assignment.clear();
        self.cruncher.retire();
    }
}

// ── CrunchingManager ────────────────────────────────────────────

/// Schedules crunchers for jobs and commits their output.
///
/// Jobs are keyed by a synthetic [`JobId`]; crunching profiles are never
/// used as keys.
pub struct CrunchingManager<Sp: Simpack> {
    simpack: Arc<Sp>,
    tree: SharedTree<Sp::State, Sp::Profile>,
    config: ManagerConfig<Sp>,
    active: usize,
    kinds: StepKindCache<Sp::Profile>,
    jobs: IndexMap<JobId, Job<Sp::Profile>>,
    crunchers: IndexMap<JobId, CruncherEntry<Sp>>,
    next_job: u64,
}

impl<Sp: Simpack> CrunchingManager<Sp> {
    /// Manage crunching of `tree` with `simpack`.
    ///
    /// Fails if no installed cruncher type can run the simpack.
    pub fn new(
        simpack: Sp,
        tree: SharedTree<Sp::State, Sp::Profile>,
        config: ManagerConfig<Sp>,
    ) -> Result<Self, ConfigError> {
        let active = config.validate(&simpack)?;
        debug!(
            simpack = simpack.name(),
            cruncher_type = config.types[active].name(),
            "crunching manager created"
        );
        Ok(Self {
            simpack: Arc::new(simpack),
            tree,
            config,
            active,
            kinds: StepKindCache::new(),
            jobs: IndexMap::new(),
            crunchers: IndexMap::new(),
            next_job: 0,
        })
    }

    /// The managed tree.
    pub fn tree(&self) -> &SharedTree<Sp::State, Sp::Profile> {
        &self.tree
    }

    /// The simulation package.
    pub fn simpack(&self) -> &Sp {
        &self.simpack
    }

    // ── Jobs ────────────────────────────────────────────────────

    /// Schedule crunching from `node`. Takes effect on the next sync.
    pub fn add_job(&mut self, node: NodeId, crunching_profile: CrunchingProfile<Sp::Profile>) -> JobId {
        let id = JobId(self.next_job);
        self.next_job += 1;
        self.jobs.insert(id, Job::new(id, node, crunching_profile));
        id
    }

    /// A live job.
    pub fn job(&self, id: JobId) -> Option<&Job<Sp::Profile>> {
        self.jobs.get(&id)
    }

    /// A live job, for changing its profile. The change reaches its
    /// cruncher on the next sync.
    pub fn job_mut(&mut self, id: JobId) -> Option<&mut Job<Sp::Profile>> {
        self.jobs.get_mut(&id)
    }

    /// All live jobs, oldest first.
    pub fn jobs(&self) -> impl Iterator<Item = &Job<Sp::Profile>> {
        self.jobs.values()
    }

    /// Drop a job. Its cruncher is drained and retired on the next sync.
    pub fn remove_job(&mut self, id: JobId) -> Option<Job<Sp::Profile>> {
        self.jobs.shift_remove(&id)
    }

    // ── Crunchers ───────────────────────────────────────────────

    /// Whether any cruncher is running.
    pub fn is_crunching(&self) -> bool {
        !self.crunchers.is_empty()
    }

    /// Number of running crunchers.
    pub fn cruncher_count(&self) -> usize {
        self.crunchers.len()
    }

    /// Jobs that currently have a cruncher.
    pub fn crunched_job_ids(&self) -> Vec<JobId> {
        self.crunchers.keys().copied().collect()
    }

    /// Name of the cruncher type new crunchers are created with.
    pub fn cruncher_type_name(&self) -> &'static str {
        self.config.types[self.active].name()
    }

    /// Switch the cruncher type. Running crunchers of another type are
    /// replaced on the next sync.
    pub fn set_cruncher_type(&mut self, name: &str) -> Result<(), ConfigError> {
        let index = self.config.position(name)?;
        if index != self.active {
            info!(
                from = self.cruncher_type_name(),
                to = self.config.types[index].name(),
                "cruncher type switched"
            );
            self.active = index;
        }
        Ok(())
    }

    /// Retire every cruncher. Output not yet synced is discarded; jobs
    /// stay and get fresh crunchers on the next sync.
    pub fn retire_all(&mut self) {
        for (id, mut entry) in self.crunchers.drain(..) {
            entry.retire();
            debug!(job = %id, "cruncher retired");
        }
    }

    // ── Buffers ─────────────────────────────────────────────────

    /// Make sure every leaf reachable from `node` gets crunched until it
    /// is `clock_buffer` past `node`'s clock.
    ///
    /// Leaves already far enough, leaves with an end and leaves still in
    /// editing are left alone. A leaf that already has a job gets its
    /// target raised; others get a new job stepping with the leaf's own
    /// step profile, or the simpack's default for profileless roots.
    pub fn ensure_buffer(&mut self, node: NodeId, clock_buffer: f64) -> Result<(), SyncError> {
        let shared = self.tree.clone();
        let guard = shared.read();
        let tree = &*guard;
        let target = tree.node(node)?.clock() + clock_buffer;
        for leaf in tree.all_leaves(node, Some(clock_buffer))? {
            self.buffer_leaf(tree, leaf, target)?;
        }
        Ok(())
    }

    /// Like [`ensure_buffer`](Self::ensure_buffer), but only for the leaf
    /// `path` leads to from `node`.
    pub fn ensure_buffer_on_path(
        &mut self,
        node: NodeId,
        path: &mut Path,
        clock_buffer: f64,
    ) -> Result<(), SyncError> {
        let shared = self.tree.clone();
        let guard = shared.read();
        let tree = &*guard;
        let target = tree.node(node)?.clock() + clock_buffer;
        if !path.contains(tree, node) {
            return Err(PathError::HeadNotReached(node).into());
        }
        match path.last_node(tree) {
            Some(leaf) => self.buffer_leaf(tree, leaf, target),
            None => Ok(()),
        }
    }

    fn buffer_leaf(&mut self, tree: &SimTree<Sp>, leaf: NodeId, target: f64) -> Result<(), SyncError> {
        let node = tree.node(leaf)?;
        if node.has_end() || node.is_still_in_editing() || node.clock() >= target {
            return Ok(());
        }
        if let Some(job) = self.jobs.values_mut().find(|job| job.node == leaf) {
            job.crunching_profile.raise_clock_target(target);
            return Ok(());
        }
        let step_profile = match node.step_profile() {
            Some(profile) => profile.clone(),
            None => self.simpack.default_profile(),
        };
        self.add_job(leaf, CrunchingProfile::new(target, step_profile));
        Ok(())
    }

    // ── Sync ────────────────────────────────────────────────────

    /// Reconcile crunchers with jobs and commit their output.
    ///
    /// Under the tree's write lock: drains and retires crunchers whose
    /// job is gone, then for each job drains its cruncher, advances
    /// `job.node`, and retires, replaces, updates or creates crunchers
    /// as the job requires. Returns the number of states committed.
    ///
    /// Not re-entrant. Must not be called while the caller holds a guard
    /// on the tree.
    pub fn sync_crunchers(&mut self) -> Result<usize, SyncError> {
        let shared = self.tree.clone();
        let mut guard = shared.write();
        let tree = &mut *guard;

        let mut added = self.collect_orphans(tree)?;
        let ids: Vec<JobId> = self.jobs.keys().copied().collect();
        for id in ids {
            added += self.advance_job(tree, id)?;
        }
        if added > 0 {
            debug!(
                added,
                jobs = self.jobs.len(),
                crunchers = self.crunchers.len(),
                "sync committed states"
            );
        }
        Ok(added)
    }

    fn collect_orphans(&mut self, tree: &mut SimTree<Sp>) -> Result<usize, SyncError> {
        let orphans: Vec<JobId> = self
            .crunchers
            .keys()
            .filter(|id| !self.jobs.contains_key(*id))
            .copied()
            .collect();
        let mut added = 0;
        for id in orphans {
            if let Some(mut entry) = self.crunchers.shift_remove(&id) {
                let drained = entry.drain(tree, id);
                entry.retire();
                debug!(job = %id, "orphaned cruncher retired");
                added += drained?.added;
            }
        }
        Ok(added)
    }

    fn advance_job(&mut self, tree: &mut SimTree<Sp>, id: JobId) -> Result<usize, SyncError> {
        let active = self.config.types[self.active].name();
        if !self.crunchers.contains_key(&id) {
            self.start_cruncher(tree, id)?;
            return Ok(0);
        }
        let (Some(job), Some(entry)) = (self.jobs.get_mut(&id), self.crunchers.get_mut(&id)) else {
            return Ok(0);
        };

        // Liveness first: a worker that dies after this check still has
        // everything it produced drained below.
        let alive = entry.cruncher.is_alive();
        let drained = entry.drain(tree, id)?;
        job.node = entry.node;
        if drained.ended {
            job.mark_ended();
        }

        if job.is_done(tree) {
            if let Some(mut entry) = self.crunchers.shift_remove(&id) {
                entry.retire();
            }
            self.jobs.shift_remove(&id);
            debug!(job = %id, "job done");
            return Ok(drained.added);
        }

        let replace = if !alive {
            warn!(
                job = %id,
                cruncher_type = entry.cruncher_type,
                "cruncher found dead; replacing"
            );
            true
        } else if entry.cruncher_type != active {
            debug!(
                job = %id,
                from = entry.cruncher_type,
                to = active,
                "cruncher type changed; replacing cruncher"
            );
            true
        } else if job.crunching_profile.step_profile != entry.sent.step_profile {
            debug!(job = %id, "step profile changed; replacing cruncher");
            true
        } else {
            if job.crunching_profile != entry.sent {
                entry
                    .cruncher
                    .update_crunching_profile(job.crunching_profile.clone())
                    .map_err(|source| SyncError::Cruncher { job: id, source })?;
                entry.sent = job.crunching_profile.clone();
            }
            false
        };
        if replace {
            if let Some(mut old) = self.crunchers.shift_remove(&id) {
                old.retire();
            }
            self.start_cruncher(tree, id)?;
        }
        Ok(drained.added)
    }

    /// Start a cruncher for a job without one, or drop the job if it is
    /// already done.
    fn start_cruncher(&mut self, tree: &SimTree<Sp>, id: JobId) -> Result<(), SyncError> {
        let Some(job) = self.jobs.get(&id) else {
            return Ok(());
        };
        if job.is_done(tree) {
            self.jobs.shift_remove(&id);
            debug!(job = %id, "job done before crunching");
            return Ok(());
        }
        let node = tree.node(job.node)?;
        if node.is_still_in_editing() {
            return Ok(());
        }

        let kind = self.kinds.kind(&*self.simpack, &job.crunching_profile.step_profile);
        let cruncher_type = Arc::clone(&self.config.types[self.active]);
        if !cruncher_type.can_crunch(kind) {
            return Err(SyncError::UnsupportedStepKind {
                job: id,
                cruncher_type: cruncher_type.name(),
                kind,
            });
        }

        let assignment = Arc::new(Assignment::new(job.node));
        let setup = CruncherSetup {
            simpack: Arc::clone(&self.simpack),
            tree: self.tree.clone(),
            state: node.state().clone(),
            clock: node.clock(),
            crunching_profile: job.crunching_profile.clone(),
            step_kind: kind,
            assignment: Arc::clone(&assignment),
            output: OutputQueue::new(),
        };
        let failed = move |source| SyncError::Cruncher { job: id, source };
        let mut cruncher = cruncher_type.create(setup).map_err(failed)?;
        cruncher.start().map_err(failed)?;
        debug!(
            job = %id,
            node = %job.node,
            cruncher_type = cruncher_type.name(),
            "cruncher started"
        );
        self.crunchers.insert(
            id,
            CruncherEntry {
                cruncher,
                assignment,
                cruncher_type: cruncher_type.name(),
                sent: job.crunching_profile.clone(),
                node: job.node,
            },
        );
        Ok(())
    }
}

impl<Sp: Simpack> Drop for CrunchingManager<Sp> {
    fn drop(&mut self) {
        self.retire_all();
    }
}
