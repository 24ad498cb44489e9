//! Jobs: a node to crunch from paired with a crunching profile.

use std::fmt;

use timetree_core::{NodeId, Tree};

use crate::profile::CrunchingProfile;

/// Synthetic job identifier, unique within one manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

/// A unit of scheduled crunching.
///
/// `node` advances to the newest produced node each time the manager
/// commits the cruncher's output.
#[derive(Clone, Debug)]
pub struct Job<P> {
    id: JobId,
    /// The node to resume crunching from.
    pub node: NodeId,
    /// How far to crunch, and with what.
    pub crunching_profile: CrunchingProfile<P>,
    resulted_in_end: bool,
}

impl<P> Job<P> {
    pub(crate) fn new(id: JobId, node: NodeId, crunching_profile: CrunchingProfile<P>) -> Self {
        Self {
            id,
            node,
            crunching_profile,
            resulted_in_end: false,
        }
    }

    /// This job's id.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Whether crunching hit an end-of-simulation marker. Once set it
    /// stays set.
    pub fn resulted_in_end(&self) -> bool {
        self.resulted_in_end
    }

    pub(crate) fn mark_ended(&mut self) {
        self.resulted_in_end = true;
    }

    /// Whether the job needs no more crunching: its node satisfies the
    /// profile, or the simulation ended.
    pub fn is_done<S>(&self, tree: &Tree<S, P>) -> bool {
        self.resulted_in_end
            || tree
                .get(self.node)
                .is_some_and(|node| self.crunching_profile.state_satisfies(node.clock()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timetree_test_utils::{tally_line, TallyProfile};

    #[test]
    fn done_when_node_reaches_target() {
        let (tree, nodes) = tally_line(4, TallyProfile::Add(1));
        let job = Job::new(JobId(0), nodes[1], CrunchingProfile::new(3.0, TallyProfile::Add(1)));
        assert!(!job.is_done(&tree));
        let job = Job::new(JobId(1), nodes[3], CrunchingProfile::new(3.0, TallyProfile::Add(1)));
        assert!(job.is_done(&tree));
    }

    #[test]
    fn end_is_sticky() {
        let (tree, nodes) = tally_line(2, TallyProfile::Add(1));
        let mut job = Job::new(JobId(0), nodes[0], CrunchingProfile::new(5.0, TallyProfile::Add(1)));
        job.mark_ended();
        assert!(job.is_done(&tree));
        job.crunching_profile.raise_clock_target(1e9);
        job.crunching_profile.raise_clock_target(f64::INFINITY);
        assert!(job.is_done(&tree));
        assert!(job.resulted_in_end());
    }
}
