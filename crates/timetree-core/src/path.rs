//! Decision-recording routes through a tree.
//!
//! A [`Path`] is a root plus the child chosen at each fork. It never owns
//! nodes; every operation borrows the [`Tree`] it navigates. Walking past
//! a fork with no recorded decision picks the first child and memoizes
//! that choice, so repeated traversals agree.
//!
//! Blocks are walked as one unit, which makes indexing and monotonic
//! search proportional to the number of forks and blocks on the route
//! rather than its raw length.

use indexmap::IndexMap;

use crate::error::PathError;
use crate::id::{BlockId, NodeId};
use crate::node::Node;
use crate::search::{bracket_indices, Bracket, Rounded, Rounding};
use crate::tree::Tree;

/// One unit of a blockwise walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathItem {
    /// A node outside any block.
    Node(NodeId),
    /// Members `from..=to` of a block.
    Run {
        /// The block walked through.
        block: BlockId,
        /// First member index visited.
        from: usize,
        /// Last member index visited.
        to: usize,
    },
}

impl PathItem {
    /// Number of nodes covered.
    pub fn len(&self) -> usize {
        match *self {
            Self::Node(_) => 1,
            Self::Run { from, to, .. } => to - from + 1,
        }
    }

    /// Always `false`: every item covers at least one node.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The nodes covered, in path order.
    pub fn nodes<'t, S, P>(&self, tree: &'t Tree<S, P>) -> &'t [NodeId] {
        match *self {
            Self::Node(id) => std::slice::from_ref(&tree.nodes[id.index()].id),
            Self::Run { block, from, to } => &tree.blocks[block.index()].nodes[from..=to],
        }
    }
}

/// A chosen line through the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    root: Option<NodeId>,
    decisions: IndexMap<NodeId, NodeId>,
}

impl Path {
    /// A path starting at `root` with no decisions yet.
    pub fn new(root: NodeId) -> Self {
        Self {
            root: Some(root),
            decisions: IndexMap::new(),
        }
    }

    /// The path's root.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Recorded fork decisions, `fork -> chosen child`, in recording order.
    pub fn decisions(&self) -> &IndexMap<NodeId, NodeId> {
        &self.decisions
    }

    /// A path through `node` that follows the newest child at every fork
    /// below it.
    pub fn containing<S, P>(tree: &Tree<S, P>, node: NodeId) -> Result<Self, PathError> {
        let mut path = Self::past(tree, node)?;
        let mut current = node;
        loop {
            let here = &tree.nodes[current.index()];
            if let Some(tail) = here.block.map(|b| tree.blocks[b.index()].tail()) {
                if tail != current {
                    current = tail;
                    continue;
                }
            }
            match here.children.as_slice() {
                [] => break,
                [only] => current = *only,
                [.., newest] => {
                    path.decisions.insert(current, *newest);
                    current = *newest;
                }
            }
        }
        Ok(path)
    }

    /// A path through `node` that records no decision beyond it.
    pub fn past<S, P>(tree: &Tree<S, P>, node: NodeId) -> Result<Self, PathError> {
        let mut path = Self::default();
        path.modify_to_include(tree, node)?;
        Ok(path)
    }

    /// Every distinct route from `node`'s root through `node` to each leaf
    /// reachable from `node`.
    ///
    /// Combinatorial in the number of forks below `node`; meant for
    /// diagnostics and tests.
    pub fn all_possible_paths<S, P>(tree: &Tree<S, P>, node: NodeId) -> Result<Vec<Self>, PathError> {
        let mut paths = Vec::new();
        let mut stack = vec![(node, Self::past(tree, node)?)];
        while let Some((mut current, mut path)) = stack.pop() {
            loop {
                let here = &tree.nodes[current.index()];
                if let Some(tail) = here.block.map(|b| tree.blocks[b.index()].tail()) {
                    if tail != current {
                        current = tail;
                        continue;
                    }
                }
                match here.children.as_slice() {
                    [] => {
                        paths.push(path);
                        break;
                    }
                    [only] => current = *only,
                    children => {
                        for &child in children.iter().rev() {
                            let mut branch = path.clone();
                            branch.decisions.insert(current, child);
                            stack.push((child, branch));
                        }
                        break;
                    }
                }
            }
        }
        Ok(paths)
    }

    /// Point the path at `node`'s root and record the decisions needed to
    /// pass through `node`, overriding earlier ones.
    pub fn modify_to_include<S, P>(&mut self, tree: &Tree<S, P>, node: NodeId) -> Result<(), PathError> {
        tree.node(node)?;
        let mut child = node;
        loop {
            let here = &tree.nodes[child.index()];
            if let Some(head) = here.block.map(|b| tree.blocks[b.index()].head()) {
                if head != child {
                    child = head;
                    continue;
                }
            }
            match here.parent {
                Some(parent) => {
                    if tree.nodes[parent.index()].is_fork() {
                        self.decisions.insert(parent, child);
                    }
                    child = parent;
                }
                None => break,
            }
        }
        self.root = Some(child);
        Ok(())
    }

    /// Whether `node` lies on this path, without memoizing anything.
    pub fn contains<S, P>(&self, tree: &Tree<S, P>, node: NodeId) -> bool {
        if tree.get(node).is_none() {
            return false;
        }
        let mut child = node;
        loop {
            let here = &tree.nodes[child.index()];
            if let Some(head) = here.block.map(|b| tree.blocks[b.index()].head()) {
                if head != child {
                    child = head;
                    continue;
                }
            }
            match here.parent {
                Some(parent) => {
                    let parent_node = &tree.nodes[parent.index()];
                    if parent_node.is_fork() {
                        let chosen = self
                            .decisions
                            .get(&parent)
                            .copied()
                            .unwrap_or(parent_node.children[0]);
                        if chosen != child {
                            return false;
                        }
                    }
                    child = parent;
                }
                None => return self.root == Some(child),
            }
        }
    }

    /// The node after `node` on this path, memoizing a default decision at
    /// unrecorded forks.
    pub fn next_node<S, P>(&mut self, tree: &Tree<S, P>, node: NodeId) -> Option<NodeId> {
        let children = tree.get(node)?.children.as_slice();
        match children {
            [] => None,
            [only] => Some(*only),
            [first, ..] => Some(*self.decisions.entry(node).or_insert(*first)),
        }
    }

    /// Iterate node by node from `head` (default: the root) to `tail`
    /// (default: the end of the path), inclusive.
    pub fn iter_nodes<'a, S, P>(
        &'a mut self,
        tree: &'a Tree<S, P>,
        head: Option<NodeId>,
        tail: Option<NodeId>,
    ) -> Result<NodeIter<'a, S, P>, PathError> {
        let start = self.check_bounds(tree, head, tail)?;
        Ok(NodeIter {
            path: self,
            tree,
            next: Some(start),
            tail,
        })
    }

    /// Iterate in [`PathItem`]s, walking each block run as one unit.
    pub fn iter_blockwise<'a, S, P>(
        &'a mut self,
        tree: &'a Tree<S, P>,
        head: Option<NodeId>,
        tail: Option<NodeId>,
    ) -> Result<Blockwise<'a, S, P>, PathError> {
        let start = self.check_bounds(tree, head, tail)?;
        Ok(Blockwise {
            path: self,
            tree,
            next: Some(start),
            tail,
        })
    }

    /// Number of nodes from the root to the end of the path.
    pub fn len<S, P>(&mut self, tree: &Tree<S, P>) -> usize {
        self.len_between(tree, None, None).unwrap_or(0)
    }

    /// Whether the path has no root.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes from `head` to `tail`, inclusive.
    pub fn len_between<S, P>(
        &mut self,
        tree: &Tree<S, P>,
        head: Option<NodeId>,
        tail: Option<NodeId>,
    ) -> Result<usize, PathError> {
        Ok(self.iter_blockwise(tree, head, tail)?.map(|item| item.len()).sum())
    }

    /// The final node of the path.
    pub fn last_node<S, P>(&mut self, tree: &Tree<S, P>) -> Option<NodeId> {
        let last = self.iter_blockwise(tree, None, None).ok()?.last()?;
        last.nodes(tree).last().copied()
    }

    /// Node at `index`; negative indices count back from the last node.
    pub fn at<S, P>(&mut self, tree: &Tree<S, P>, index: isize) -> Result<NodeId, PathError> {
        self.at_between(tree, index, None, None)
    }

    /// Node at `index` counted within `head..=tail`.
    pub fn at_between<S, P>(
        &mut self,
        tree: &Tree<S, P>,
        index: isize,
        head: Option<NodeId>,
        tail: Option<NodeId>,
    ) -> Result<NodeId, PathError> {
        let mut remaining = if index < 0 {
            let len = self.len_between(tree, head, tail)?;
            len.checked_sub(index.unsigned_abs())
                .ok_or(PathError::OutOfRange { index, len })?
        } else {
            index as usize
        };
        let mut seen = 0;
        for item in self.iter_blockwise(tree, head, tail)? {
            let nodes = item.nodes(tree);
            if remaining < nodes.len() {
                return Ok(nodes[remaining]);
            }
            remaining -= nodes.len();
            seen += nodes.len();
        }
        Err(PathError::OutOfRange { index, len: seen })
    }

    /// Position of `node` on the path, counted from the root.
    pub fn index_of<S, P>(&self, tree: &Tree<S, P>, node: NodeId) -> Result<usize, PathError> {
        if !self.contains(tree, node) {
            return Err(PathError::TailNotReached(node));
        }
        Ok(tree.depth(node)?)
    }

    /// Bracket `value` along the path (up to `tail`) under a
    /// non-decreasing `f`.
    pub fn bracket_by_monotonic_function<S, P>(
        &mut self,
        tree: &Tree<S, P>,
        f: impl Fn(&Node<S, P>) -> f64,
        value: f64,
        tail: Option<NodeId>,
    ) -> Result<Bracket<NodeId>, PathError> {
        let mut bracket = Bracket::empty();
        for item in self.iter_blockwise(tree, None, tail)? {
            let nodes = item.nodes(tree);
            let eval = |i: usize| f(&tree.nodes[nodes[i].index()]);
            let run = bracket_indices(nodes.len(), eval, value).map(|i| nodes[i]);
            bracket = bracket.then(run);
            if eval(nodes.len() - 1) > value {
                break;
            }
        }
        Ok(bracket)
    }

    /// Binary search the path for `value` under a non-decreasing `f`,
    /// rounding as requested.
    pub fn node_by_monotonic_function<S, P>(
        &mut self,
        tree: &Tree<S, P>,
        f: impl Fn(&Node<S, P>) -> f64,
        value: f64,
        rounding: Rounding,
        tail: Option<NodeId>,
    ) -> Result<Rounded<NodeId>, PathError> {
        Ok(self
            .bracket_by_monotonic_function(tree, f, value, tail)?
            .round(value, rounding))
    }

    /// Look a node up by its clock.
    pub fn node_by_clock<S, P>(
        &mut self,
        tree: &Tree<S, P>,
        clock: f64,
        rounding: Rounding,
        tail: Option<NodeId>,
    ) -> Result<Rounded<NodeId>, PathError> {
        self.node_by_monotonic_function(tree, |node: &Node<S, P>| node.clock(), clock, rounding, tail)
    }

    fn check_bounds<S, P>(
        &self,
        tree: &Tree<S, P>,
        head: Option<NodeId>,
        tail: Option<NodeId>,
    ) -> Result<NodeId, PathError> {
        let start = match head {
            Some(head) if self.contains(tree, head) => head,
            Some(head) => return Err(PathError::HeadNotReached(head)),
            None => {
                let root = self.root.ok_or(PathError::EmptyPath)?;
                tree.node(root)?;
                root
            }
        };
        if let Some(tail) = tail {
            let reached = self.contains(tree, tail)
                && (tail == start || tree.ancestors(tail)?.any(|a| a == start));
            if !reached {
                return Err(PathError::TailNotReached(tail));
            }
        }
        Ok(start)
    }
}

/// Node-by-node iterator returned by [`Path::iter_nodes`].
pub struct NodeIter<'a, S, P> {
    path: &'a mut Path,
    tree: &'a Tree<S, P>,
    next: Option<NodeId>,
    tail: Option<NodeId>,
}

impl<S, P> Iterator for NodeIter<'_, S, P> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = if Some(current) == self.tail {
            None
        } else {
            self.path.next_node(self.tree, current)
        };
        Some(current)
    }
}

/// Blockwise iterator returned by [`Path::iter_blockwise`].
pub struct Blockwise<'a, S, P> {
    path: &'a mut Path,
    tree: &'a Tree<S, P>,
    next: Option<NodeId>,
    tail: Option<NodeId>,
}

impl<S, P> Iterator for Blockwise<'_, S, P> {
    type Item = PathItem;

    fn next(&mut self) -> Option<PathItem> {
        let current = self.next?;
        let tree = self.tree;
        let (item, last) = match tree.nodes[current.index()].block {
            Some(block_id) => {
                let block = &tree.blocks[block_id.index()];
                let from = block.index_of(current).ok()?;
                let to = self
                    .tail
                    .and_then(|tail| block.index_of(tail).ok())
                    .filter(|&t| t >= from)
                    .unwrap_or(block.len() - 1);
                let item = PathItem::Run {
                    block: block_id,
                    from,
                    to,
                };
                (item, block.nodes[to])
            }
            None => (PathItem::Node(current), current),
        };
        self.next = if Some(last) == self.tail {
            None
        } else {
            self.path.next_node(tree, last)
        };
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;
    use crate::testing::{Clocked, Clockless, P};

    /// root -> a1 -> a2 -> a3 (block) with a fork at a1: a1 -> b2 -> b3.
    fn forked() -> (Tree<Clockless, P>, Vec<NodeId>, Vec<NodeId>) {
        let mut tree = Tree::new();
        let root = tree.add_state(Clockless, None, None).unwrap();
        let a1 = tree.add_state(Clockless, Some(root), Some(P(0))).unwrap();
        let a2 = tree.add_state(Clockless, Some(a1), Some(P(0))).unwrap();
        let a3 = tree.add_state(Clockless, Some(a2), Some(P(0))).unwrap();
        let b2 = tree.add_state(Clockless, Some(a1), Some(P(0))).unwrap();
        let b3 = tree.add_state(Clockless, Some(b2), Some(P(0))).unwrap();
        (tree, vec![root, a1, a2, a3], vec![b2, b3])
    }

    fn linear(len: usize) -> (Tree<Clocked, P>, Vec<NodeId>) {
        let mut tree = Tree::new();
        let mut nodes = vec![tree.add_state(Clocked(None), None, None).unwrap()];
        for _ in 1..len {
            let last = *nodes.last().unwrap();
            nodes.push(tree.add_state(Clocked(None), Some(last), Some(P(0))).unwrap());
        }
        (tree, nodes)
    }

    #[test]
    fn default_branch_is_first_child_and_memoized() {
        let (tree, a, _) = forked();
        let mut path = Path::new(a[0]);
        let walked: Vec<_> = path.iter_nodes(&tree, None, None).unwrap().collect();
        assert_eq!(walked, a);
        assert_eq!(path.decisions().get(&a[1]), Some(&a[2]));
        let again: Vec<_> = path.iter_nodes(&tree, None, None).unwrap().collect();
        assert_eq!(again, walked);
    }

    #[test]
    fn indexing_positive_and_negative() {
        let (tree, a, _) = forked();
        let mut path = Path::new(a[0]);
        assert_eq!(path.len(&tree), 4);
        assert_eq!(path.at(&tree, 0), Ok(a[0]));
        assert_eq!(path.at(&tree, 3), Ok(a[3]));
        assert_eq!(path.at(&tree, -1), Ok(a[3]));
        assert_eq!(path.at(&tree, -4), Ok(a[0]));
        assert_eq!(
            path.at(&tree, 4),
            Err(PathError::OutOfRange { index: 4, len: 4 })
        );
        assert_eq!(
            path.at(&tree, -5),
            Err(PathError::OutOfRange { index: -5, len: 4 })
        );
        assert_eq!(path.last_node(&tree), Some(a[3]));
    }

    #[test]
    fn containing_path_follows_newest_fork() {
        let (tree, a, b) = forked();
        let mut path = Path::containing(&tree, a[0]).unwrap();
        assert_eq!(path.last_node(&tree), Some(b[1]));
        assert!(path.contains(&tree, b[0]));
        assert!(!path.contains(&tree, a[2]));

        let mut through_a = Path::containing(&tree, a[2]).unwrap();
        assert_eq!(through_a.last_node(&tree), Some(a[3]));
    }

    #[test]
    fn past_path_records_only_ancestors() {
        let (tree, a, b) = forked();
        let path = Path::past(&tree, b[1]).unwrap();
        assert_eq!(path.root(), Some(a[0]));
        assert_eq!(path.decisions().len(), 1);
        assert_eq!(path.decisions().get(&a[1]), Some(&b[0]));
        assert_eq!(path.index_of(&tree, b[1]), Ok(3));

        let unrelated = Path::past(&tree, a[1]).unwrap();
        assert!(unrelated.decisions().is_empty());
    }

    #[test]
    fn anchors_off_the_route_are_distinguished() {
        let (tree, a, b) = forked();
        let mut path = Path::new(a[0]);
        assert_eq!(
            path.at_between(&tree, 0, None, Some(b[1])).unwrap_err(),
            PathError::TailNotReached(b[1])
        );
        assert_eq!(
            path.at_between(&tree, 0, Some(b[0]), None).unwrap_err(),
            PathError::HeadNotReached(b[0])
        );
        assert_eq!(
            path.at_between(&tree, 0, Some(a[2]), Some(a[1])).unwrap_err(),
            PathError::TailNotReached(a[1])
        );
        assert_eq!(path.at_between(&tree, 1, Some(a[1]), Some(a[2])), Ok(a[2]));
        assert_eq!(path.at_between(&tree, -1, None, Some(a[2])), Ok(a[2]));
    }

    #[test]
    fn unknown_root_is_an_error() {
        let (tree, _, _) = forked();
        let stray = NodeId(42);
        let mut path = Path::new(stray);
        let unknown = PathError::Tree(TreeError::UnknownNode(stray));
        assert_eq!(path.at(&tree, 0), Err(unknown.clone()));
        assert_eq!(path.len_between(&tree, None, None), Err(unknown.clone()));
        assert_eq!(path.len(&tree), 0);
        assert_eq!(path.last_node(&tree), None);
        assert_eq!(
            path.node_by_clock(&tree, 1.0, Rounding::Low, None),
            Err(unknown)
        );
    }

    #[test]
    fn empty_path_reports_empty() {
        let (tree, _, _) = forked();
        let mut path = Path::default();
        assert!(path.is_empty());
        assert_eq!(path.len(&tree), 0);
        assert_eq!(path.at(&tree, 0), Err(PathError::EmptyPath));
    }

    #[test]
    fn all_possible_paths_enumerates_leaves() {
        let (tree, a, b) = forked();
        let mut paths = Path::all_possible_paths(&tree, a[0]).unwrap();
        assert_eq!(paths.len(), 2);
        let mut ends: Vec<_> = paths.iter_mut().filter_map(|p| p.last_node(&tree)).collect();
        ends.sort();
        assert_eq!(ends, vec![a[3], b[1]]);

        let below_fork = Path::all_possible_paths(&tree, b[0]).unwrap();
        assert_eq!(below_fork.len(), 1);
    }

    #[test]
    fn blockwise_walk_groups_runs() {
        let (tree, nodes) = linear(6);
        let mut path = Path::new(nodes[0]);
        let items: Vec<_> = path.iter_blockwise(&tree, None, None).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], PathItem::Node(nodes[0]));
        assert_eq!(items[1].len(), 5);

        let partial: Vec<_> = path
            .iter_blockwise(&tree, Some(nodes[2]), Some(nodes[4]))
            .unwrap()
            .collect();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].nodes(&tree), &nodes[2..=4]);
    }

    #[test]
    fn clock_lookup_rounding() {
        let (tree, nodes) = linear(5);
        let mut path = Path::new(nodes[0]);
        let lookup = |path: &mut Path, clock, rounding| {
            path.node_by_clock(&tree, clock, rounding, None).unwrap()
        };
        assert_eq!(lookup(&mut path, 2.0, Rounding::Exact), Rounded::One(Some(nodes[2])));
        assert_eq!(lookup(&mut path, 2.5, Rounding::Exact), Rounded::One(None));
        assert_eq!(lookup(&mut path, 2.5, Rounding::Low), Rounded::One(Some(nodes[2])));
        assert_eq!(lookup(&mut path, 2.5, Rounding::High), Rounded::One(Some(nodes[3])));
        assert_eq!(lookup(&mut path, 2.6, Rounding::Closest), Rounded::One(Some(nodes[3])));
        assert_eq!(
            lookup(&mut path, -1.0, Rounding::Both),
            Rounded::Both { low: None, high: Some(nodes[0]) }
        );
        assert_eq!(
            lookup(&mut path, 40.0, Rounding::Both),
            Rounded::Both { low: Some(nodes[4]), high: None }
        );
        let capped = path
            .node_by_clock(&tree, 40.0, Rounding::Low, Some(nodes[1]))
            .unwrap();
        assert_eq!(capped, Rounded::One(Some(nodes[1])));
    }

    #[test]
    fn containing_and_past_agree_on_prefix() {
        let (tree, a, b) = forked();
        let mut containing = Path::containing(&tree, b[0]).unwrap();
        let mut past = Path::past(&tree, b[0]).unwrap();
        for i in 0..3 {
            assert_eq!(containing.at(&tree, i), past.at(&tree, i));
        }
        assert_eq!(past.at(&tree, 1), Ok(a[1]));
    }

    // ── proptests ──────────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn monotonic_search_matches_linear_scan(
                steps in proptest::collection::vec(0u8..3, 1..60),
                fork_at in 0usize..60,
                target in 0u32..200,
            ) {
                // Clocks grow by 0, 1 or 2 per step (plateaus included).
                let mut tree: Tree<Clocked, P> = Tree::new();
                let mut nodes = vec![tree.add_state(Clocked(Some(0.0)), None, None).unwrap()];
                let mut clock = 0.0;
                for step in &steps {
                    clock += f64::from(*step);
                    let last = *nodes.last().unwrap();
                    nodes.push(tree.add_state(Clocked(Some(clock)), Some(last), Some(P(0))).unwrap());
                }
                // A side branch must not disturb the default route.
                let fork_parent = nodes[fork_at % (nodes.len() - 1)];
                tree.add_state(Clocked(Some(1e9)), Some(fork_parent), Some(P(1))).unwrap();

                let value = f64::from(target) / 2.0;
                let clocks: Vec<f64> = nodes.iter().map(|&n| tree.node(n).unwrap().clock()).collect();
                let mut path = Path::new(nodes[0]);
                let bracket = path
                    .bracket_by_monotonic_function(&tree, |n| n.clock(), value, None)
                    .unwrap();
                let low = clocks.iter().rposition(|&c| c <= value).map(|i| nodes[i]);
                let high = clocks.iter().position(|&c| c >= value).map(|i| nodes[i]);
                prop_assert_eq!(bracket.low.map(|(n, _)| n), low);
                prop_assert_eq!(bracket.high.map(|(n, _)| n), high);
            }

            #[test]
            fn negative_and_positive_indices_agree(len in 1usize..40, back in 1usize..40) {
                let (tree, nodes) = linear(len);
                let mut path = Path::new(nodes[0]);
                let back = back.min(len);
                prop_assert_eq!(
                    path.at(&tree, -(back as isize)),
                    path.at(&tree, (len - back) as isize)
                );
            }
        }
    }
}
