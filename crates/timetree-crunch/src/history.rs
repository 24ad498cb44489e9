//! [`HistoryView`] over a worker's committed past plus its own pending
//! output.

use std::sync::Arc;

use timetree_core::search::bracket_indices;
use timetree_core::{
    Bracket, HistoryError, HistoryView, Node, NodeId, Path, PathError, Rounded, Rounding,
    SharedTree, State, StepProfile, Tree, TreeError,
};

use crate::queue::{Assignment, OutputQueue};

/// The timeline a history-dependent worker sees.
///
/// Committed nodes from the root to the job's assigned node come first,
/// oldest first, followed by the worker's not-yet-drained states. Every
/// accessor holds the tree's read lock for its duration, so a sync pass
/// moving states from the queue into the tree is never observed half
/// done. Once the worker's job is retired every accessor fails with
/// [`HistoryError::ObsoleteWorker`].
pub struct HistoryBrowser<S, P> {
    tree: SharedTree<S, P>,
    assignment: Arc<Assignment>,
    output: OutputQueue<S>,
}

impl<S: State, P: StepProfile> HistoryBrowser<S, P> {
    /// Browse the history of the worker owning `assignment` and `output`.
    pub fn new(tree: SharedTree<S, P>, assignment: Arc<Assignment>, output: OutputQueue<S>) -> Self {
        Self {
            tree,
            assignment,
            output,
        }
    }

    fn assigned(&self) -> Result<NodeId, HistoryError> {
        self.assignment.node().ok_or(HistoryError::ObsoleteWorker)
    }
}

fn committed_len<S, P>(tree: &Tree<S, P>, node: NodeId) -> Result<usize, HistoryError> {
    Ok(tree.depth(node).map_err(PathError::from)? + 1)
}

impl<S: State, P: StepProfile> HistoryView<S> for HistoryBrowser<S, P> {
    fn len(&self) -> Result<usize, HistoryError> {
        let guard = self.tree.read();
        let tree = &*guard;
        let node = self.assigned()?;
        Ok(committed_len(tree, node)? + self.output.pending().len())
    }

    fn at(&self, index: isize) -> Result<S, HistoryError> {
        let guard = self.tree.read();
        let tree = &*guard;
        let node = self.assigned()?;
        let mut pending = self.output.pending();
        let committed = committed_len(tree, node)?;
        let len = committed + pending.len();
        let position = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize).filter(|&i| i < len)
        }
        .ok_or(HistoryError::OutOfRange { index, len })?;

        if position >= committed {
            let (state, _) = pending.swap_remove(position - committed);
            return Ok(state);
        }
        let mut path = Path::past(tree, node)?;
        let found = path.at_between(tree, position as isize, None, Some(node))?;
        Ok(tree.node(found).map_err(PathError::from)?.state().clone())
    }

    fn by_monotonic_function(
        &self,
        f: &dyn Fn(&S, f64) -> f64,
        value: f64,
        rounding: Rounding,
    ) -> Result<Rounded<S>, HistoryError> {
        let guard = self.tree.read();
        let tree = &*guard;
        let node = self.assigned()?;
        let mut path = Path::past(tree, node)?;
        let ids = path.bracket_by_monotonic_function(
            tree,
            |n: &Node<S, P>| f(n.state(), n.clock()),
            value,
            Some(node),
        )?;
        let state_of = |side: Option<(NodeId, f64)>| -> Result<Option<(S, f64)>, TreeError> {
            side.map(|(id, v)| tree.node(id).map(|n| (n.state().clone(), v)))
                .transpose()
        };
        let committed = Bracket {
            low: state_of(ids.low).map_err(PathError::from)?,
            high: state_of(ids.high).map_err(PathError::from)?,
        };
        let pending = self.output.pending();
        let queued = bracket_indices(pending.len(), |i| f(&pending[i].0, pending[i].1), value)
            .map(|i| pending[i].0.clone());
        Ok(committed.then(queued).round(value, rounding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CrunchItem;
    use timetree_test_utils::{tally_line, Tally, TallyProfile};

    type Browser = HistoryBrowser<Tally, TallyProfile>;

    /// Committed 0..committed on a line, pending values after it.
    fn browser(committed: usize, pending: usize) -> (Browser, Arc<Assignment>) {
        let (tree, nodes) = tally_line(committed, TallyProfile::Add(1));
        let assignment = Arc::new(Assignment::new(nodes[committed - 1]));
        let output = OutputQueue::new();
        for i in 0..pending {
            let value = (committed + i) as i64;
            output.push(CrunchItem::State {
                state: Tally::new(value),
                clock: value as f64,
            });
        }
        let browser = HistoryBrowser::new(SharedTree::new(tree), Arc::clone(&assignment), output);
        (browser, assignment)
    }

    #[test]
    fn indices_span_committed_then_pending() {
        let (browser, _) = browser(3, 2);
        assert_eq!(browser.len(), Ok(5));
        assert_eq!(browser.at(0), Ok(Tally::new(0)));
        assert_eq!(browser.at(2), Ok(Tally::new(2)));
        assert_eq!(browser.at(3), Ok(Tally::new(3)));
        assert_eq!(browser.at(-1), Ok(Tally::new(4)));
        assert_eq!(browser.at(-3), Ok(Tally::new(2)));
        assert_eq!(browser.at(-5), Ok(Tally::new(0)));
        assert_eq!(browser.last_state(), Ok(Tally::new(4)));
    }

    #[test]
    fn out_of_range_both_ends() {
        let (browser, _) = browser(2, 0);
        assert_eq!(browser.at(2), Err(HistoryError::OutOfRange { index: 2, len: 2 }));
        assert_eq!(browser.at(-3), Err(HistoryError::OutOfRange { index: -3, len: 2 }));
        assert_eq!(browser.at(-1), Ok(Tally::new(1)));
    }

    #[test]
    fn retired_worker_is_obsolete() {
        let (browser, assignment) = browser(2, 1);
        assignment.clear();
        assert_eq!(browser.len(), Err(HistoryError::ObsoleteWorker));
        assert_eq!(browser.at(0), Err(HistoryError::ObsoleteWorker));
        assert_eq!(
            browser.by_clock(1.0, Rounding::Exact),
            Err(HistoryError::ObsoleteWorker)
        );
    }

    #[test]
    fn clock_search_crosses_the_boundary() {
        let (browser, _) = browser(3, 3);
        assert_eq!(
            browser.by_clock(1.0, Rounding::Exact),
            Ok(Rounded::One(Some(Tally::new(1))))
        );
        assert_eq!(
            browser.by_clock(4.0, Rounding::Exact),
            Ok(Rounded::One(Some(Tally::new(4))))
        );
        assert_eq!(
            browser.by_clock(2.5, Rounding::Both),
            Ok(Rounded::Both {
                low: Some(Tally::new(2)),
                high: Some(Tally::new(3)),
            })
        );
        assert_eq!(
            browser.by_clock(9.0, Rounding::Low),
            Ok(Rounded::One(Some(Tally::new(5))))
        );
        assert_eq!(browser.by_clock(9.0, Rounding::High), Ok(Rounded::One(None)));
    }

    #[test]
    fn search_by_state_values() {
        let (browser, _) = browser(4, 2);
        let by_value = |s: &Tally, _: f64| s.value as f64 * 10.0;
        assert_eq!(
            browser.by_monotonic_function(&by_value, 42.0, Rounding::Closest),
            Ok(Rounded::One(Some(Tally::new(4))))
        );
    }

    #[test]
    fn committed_view_stops_at_assignment() {
        let (tree, nodes) = tally_line(5, TallyProfile::Add(1));
        let assignment = Arc::new(Assignment::new(nodes[2]));
        let browser: Browser =
            HistoryBrowser::new(SharedTree::new(tree), assignment, OutputQueue::new());
        assert_eq!(browser.len(), Ok(3));
        assert_eq!(browser.at(-1), Ok(Tally::new(2)));
        assert_eq!(
            browser.by_clock(4.0, Rounding::Low),
            Ok(Rounded::One(Some(Tally::new(2))))
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn negative_and_positive_indices_agree(committed in 1usize..12, pending in 0usize..6) {
                let (browser, _) = browser(committed, pending);
                let len = committed + pending;
                prop_assert_eq!(browser.len(), Ok(len));
                for i in 0..len {
                    let forward = browser.at(i as isize);
                    let backward = browser.at(i as isize - len as isize);
                    prop_assert_eq!(&forward, &Ok(Tally::new(i as i64)));
                    prop_assert_eq!(forward, backward);
                }
            }
        }
    }
}
