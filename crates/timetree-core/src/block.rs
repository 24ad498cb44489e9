//! Blocks: compressed runs of consecutive, untouched, same-profile nodes.
//!
//! A block lets a [`Path`](crate::path::Path) skip over a long linear
//! stretch in one hop. Shape invariants, enforced on every mutation:
//!
//! - at least two members;
//! - every member except the last has exactly one child, the next member;
//! - all members share one step profile;
//! - no member is touched.
//!
//! Blocks are maintained by the [`Tree`] as nodes are linked; callers only
//! read them.

use crate::error::BlockError;
use crate::id::{BlockId, NodeId};
use crate::simpack::{State, StepProfile};
use crate::tree::Tree;

/// A run of nodes satisfying the block shape invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) nodes: Vec<NodeId>,
}

impl Block {
    /// This block's handle.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Members in order, oldest first.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of members. Always at least 2.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The first member.
    pub fn head(&self) -> NodeId {
        self.nodes[0]
    }

    /// The last member.
    pub fn tail(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    /// Member at `index`; negative indices count from the tail.
    pub fn at(&self, index: isize) -> Result<NodeId, BlockError> {
        let len = self.nodes.len();
        let resolved = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize).filter(|&i| i < len)
        };
        resolved
            .map(|i| self.nodes[i])
            .ok_or(BlockError::IndexOutOfRange { index, len })
    }

    /// Position of `node` within the block.
    pub fn index_of(&self, node: NodeId) -> Result<usize, BlockError> {
        self.nodes
            .iter()
            .position(|&n| n == node)
            .ok_or(BlockError::NotAMember {
                node,
                block: self.id,
            })
    }
}

impl<S: State, P: StepProfile> Tree<S, P> {
    /// Re-evaluate block membership after `child` was linked under
    /// `parent`.
    pub(crate) fn on_child_linked(&mut self, parent: NodeId, child: NodeId) -> Result<(), BlockError> {
        let parent_node = &self.nodes[parent.index()];
        let (child_count, parent_block) = (parent_node.children.len(), parent_node.block);
        if child_count == 1 {
            if !self.pair_qualifies(parent, child) {
                return Ok(());
            }
            match parent_block {
                Some(block) => self.append_to_block(block, child),
                None => self.form_block(vec![parent, child]).map(|_| ()),
            }
        } else {
            match parent_block {
                Some(block) if self.blocks[block.index()].tail() != parent => {
                    self.split_block_after(parent)
                }
                _ => Ok(()),
            }
        }
    }

    fn pair_qualifies(&self, parent: NodeId, child: NodeId) -> bool {
        let (p, c) = (&self.nodes[parent.index()], &self.nodes[child.index()]);
        p.blockable() && c.blockable() && p.step_profile == c.step_profile
    }

    /// Create a block from `nodes`, which must satisfy every shape
    /// invariant and be blockless.
    pub(crate) fn form_block(&mut self, nodes: Vec<NodeId>) -> Result<BlockId, BlockError> {
        self.validate_block_shape(&nodes)?;
        let claimed = nodes
            .iter()
            .find_map(|&n| self.nodes[n.index()].block.map(|b| (n, b)));
        if let Some((node, block)) = claimed {
            return Err(BlockError::AlreadyInBlock { node, block });
        }
        let entry = self.blocks.vacant_entry();
        let id = BlockId(entry.key() as u32);
        for node in &nodes {
            self.nodes[node.index()].block = Some(id);
        }
        entry.insert(Block { id, nodes });
        Ok(id)
    }

    /// Append `node` after the current tail of `block`.
    pub(crate) fn append_to_block(&mut self, block: BlockId, node: NodeId) -> Result<(), BlockError> {
        let tail = self.blocks[block.index()].tail();
        let tail_node = &self.nodes[tail.index()];
        let new_node = &self.nodes[node.index()];
        if let Some(other) = new_node.block {
            return Err(BlockError::AlreadyInBlock { node, block: other });
        }
        if new_node.touched {
            return Err(BlockError::TouchedMember { node });
        }
        if tail_node.children.as_slice() != [node] {
            return Err(BlockError::NotConsecutive { prev: tail, next: node });
        }
        if new_node.step_profile != tail_node.step_profile {
            return Err(BlockError::MixedProfiles { node });
        }
        self.nodes[node.index()].block = Some(block);
        self.blocks[block.index()].nodes.push(node);
        Ok(())
    }

    /// Cut the block containing `node` immediately after it. A side left
    /// with fewer than two members dissolves into blockless nodes.
    pub fn split_block_after(&mut self, node: NodeId) -> Result<(), BlockError> {
        let Some(block) = self.nodes.get(node.index()).and_then(|n| n.block) else {
            return Err(BlockError::NotInAnyBlock { node });
        };
        let position = self.blocks[block.index()].index_of(node)?;
        if position + 1 == self.blocks[block.index()].len() {
            return Ok(());
        }
        let mut members = self.dissolve_block(block)?;
        let right = members.split_off(position + 1);
        tracing::debug!(
            %block,
            %node,
            left = members.len(),
            right = right.len(),
            "splitting block at fork"
        );
        for side in [members, right] {
            if side.len() >= 2 {
                self.form_block(side)?;
            }
        }
        Ok(())
    }

    /// Dissolve `block` entirely, returning its former members as
    /// blockless nodes. A later single child of the old tail starts a
    /// fresh block.
    pub fn dissolve_block(&mut self, block: BlockId) -> Result<Vec<NodeId>, BlockError> {
        let removed = self
            .blocks
            .try_remove(block.index())
            .ok_or(BlockError::UnknownBlock(block))?;
        for node in &removed.nodes {
            self.nodes[node.index()].block = None;
        }
        Ok(removed.nodes)
    }

    fn validate_block_shape(&self, nodes: &[NodeId]) -> Result<(), BlockError> {
        if nodes.len() < 2 {
            return Err(BlockError::TooShort { len: nodes.len() });
        }
        let first = &self.nodes[nodes[0].index()];
        for (i, &id) in nodes.iter().enumerate() {
            let node = &self.nodes[id.index()];
            if node.touched {
                return Err(BlockError::TouchedMember { node: id });
            }
            if node.step_profile.is_none() || node.step_profile != first.step_profile {
                return Err(BlockError::MixedProfiles { node: id });
            }
            if let Some(&next) = nodes.get(i + 1) {
                if node.children.as_slice() != [next] {
                    return Err(BlockError::NotConsecutive { prev: id, next });
                }
            }
        }
        Ok(())
    }

    /// Verify every block's shape and every member's back-reference.
    pub fn check_blocks(&self) -> Result<(), BlockError> {
        for (_, block) in self.blocks.iter() {
            self.validate_block_shape(&block.nodes)?;
            for &node in &block.nodes {
                if self.nodes[node.index()].block != Some(block.id) {
                    return Err(BlockError::NotAMember {
                        node,
                        block: block.id,
                    });
                }
            }
        }
        for node in &self.nodes {
            if let Some(block) = node.block {
                let listed = self
                    .blocks
                    .get(block.index())
                    .is_some_and(|b| b.nodes.contains(&node.id));
                if !listed {
                    return Err(BlockError::NotAMember {
                        node: node.id,
                        block,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Clockless, P};

    fn chain(tree: &mut Tree<Clockless, P>, len: usize, profile: P) -> Vec<NodeId> {
        let root = tree.add_state(Clockless, None, Some(profile)).unwrap();
        let mut nodes = vec![root];
        for _ in 1..len {
            let last = *nodes.last().unwrap();
            nodes.push(tree.add_state(Clockless, Some(last), Some(profile)).unwrap());
        }
        nodes
    }

    #[test]
    fn linear_chain_forms_one_block() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 5, P(1));
        let block = tree.node(nodes[0]).unwrap().block().unwrap();
        assert_eq!(tree.block(block).unwrap().nodes(), nodes.as_slice());
        assert_eq!(tree.blocks().count(), 1);
        tree.check_blocks().unwrap();
    }

    #[test]
    fn profile_change_starts_new_block() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 3, P(1));
        let a = tree.add_state(Clockless, Some(nodes[2]), Some(P(2))).unwrap();
        let b = tree.add_state(Clockless, Some(a), Some(P(2))).unwrap();
        let first = tree.node(nodes[0]).unwrap().block().unwrap();
        let second = tree.node(a).unwrap().block().unwrap();
        assert_ne!(first, second);
        assert_eq!(tree.block(second).unwrap().nodes(), &[a, b]);
        tree.check_blocks().unwrap();
    }

    #[test]
    fn fork_splits_block_at_parent() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 6, P(1));
        tree.add_state(Clockless, Some(nodes[2]), Some(P(1))).unwrap();
        let left = tree.node(nodes[0]).unwrap().block().unwrap();
        let right = tree.node(nodes[3]).unwrap().block().unwrap();
        assert_eq!(tree.block(left).unwrap().nodes(), &nodes[..3]);
        assert_eq!(tree.block(right).unwrap().nodes(), &nodes[3..]);
        tree.check_blocks().unwrap();
    }

    #[test]
    fn split_dissolves_short_sides() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 3, P(1));
        tree.split_block_after(nodes[0]).unwrap();
        assert!(tree.node(nodes[0]).unwrap().block().is_none());
        let rest = tree.node(nodes[1]).unwrap().block().unwrap();
        assert_eq!(tree.block(rest).unwrap().nodes(), &nodes[1..]);

        tree.split_block_after(nodes[1]).unwrap();
        assert_eq!(tree.blocks().count(), 0);
        tree.check_blocks().unwrap();
    }

    #[test]
    fn dissolve_frees_every_member() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 4, P(1));
        let block = tree.node(nodes[0]).unwrap().block().unwrap();
        assert_eq!(tree.dissolve_block(block), Ok(nodes.clone()));
        assert_eq!(tree.blocks().count(), 0);
        assert!(nodes.iter().all(|&n| tree.node(n).unwrap().block().is_none()));
        assert_eq!(tree.dissolve_block(block), Err(BlockError::UnknownBlock(block)));

        // Growth after the old tail forms a new block.
        let next = tree.add_state(Clockless, Some(nodes[3]), Some(P(1))).unwrap();
        let fresh = tree.node(next).unwrap().block().unwrap();
        assert_eq!(tree.block(fresh).unwrap().nodes(), &[nodes[3], next]);
        tree.check_blocks().unwrap();
    }

    #[test]
    fn split_after_tail_is_noop() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 3, P(1));
        tree.split_block_after(nodes[2]).unwrap();
        assert_eq!(tree.blocks().count(), 1);
    }

    #[test]
    fn split_outside_block_fails() {
        let mut tree: Tree<Clockless, P> = Tree::new();
        let root = tree.add_state(Clockless, None, None).unwrap();
        assert!(matches!(
            tree.split_block_after(root),
            Err(BlockError::NotInAnyBlock { .. })
        ));
    }

    #[test]
    fn touched_nodes_never_join() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 2, P(1));
        let edited = tree.add_touched_state(Clockless, Some(nodes[1]), false).unwrap();
        tree.add_state(Clockless, Some(edited), Some(P(1))).unwrap();
        assert!(tree.node(edited).unwrap().block().is_none());
        assert_eq!(tree.blocks().count(), 1);
        tree.check_blocks().unwrap();
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        let mut tree = Tree::new();
        let a = chain(&mut tree, 1, P(1))[0];
        assert_eq!(tree.form_block(vec![a]), Err(BlockError::TooShort { len: 1 }));

        let other = tree.add_state(Clockless, None, Some(P(1))).unwrap();
        assert!(matches!(
            tree.form_block(vec![a, other]),
            Err(BlockError::NotConsecutive { .. })
        ));
    }

    #[test]
    fn block_indexing() {
        let mut tree = Tree::new();
        let nodes = chain(&mut tree, 4, P(1));
        let block = tree.block(tree.node(nodes[0]).unwrap().block().unwrap()).unwrap();
        assert_eq!(block.at(0), Ok(nodes[0]));
        assert_eq!(block.at(-1), Ok(nodes[3]));
        assert_eq!(block.at(-4), Ok(nodes[0]));
        assert!(block.at(4).is_err());
        assert!(block.at(-5).is_err());
        assert_eq!(block.index_of(nodes[2]), Ok(2));
        assert_eq!(block.head(), nodes[0]);
        assert_eq!(block.tail(), nodes[3]);
    }

    // ── proptests ──────────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Step { parent: usize, profile: u8 },
            Edit { parent: usize },
            Fork { template: usize },
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (any::<usize>(), 0u8..2).prop_map(|(parent, profile)| Op::Step { parent, profile }),
                1 => any::<usize>().prop_map(|parent| Op::Edit { parent }),
                1 => any::<usize>().prop_map(|template| Op::Fork { template }),
            ]
        }

        proptest! {
            #[test]
            fn random_growth_keeps_block_shape(ops in proptest::collection::vec(op(), 1..80)) {
                let mut tree: Tree<Clockless, P> = Tree::new();
                let root = tree.add_state(Clockless, None, None).unwrap();
                let mut ids = vec![root];
                for op in ops {
                    let created = match op {
                        Op::Step { parent, profile } => {
                            let parent = ids[parent % ids.len()];
                            tree.add_state(Clockless, Some(parent), Some(P(profile)))
                        }
                        Op::Edit { parent } => {
                            let parent = ids[parent % ids.len()];
                            tree.add_touched_state(Clockless, Some(parent), false)
                        }
                        Op::Fork { template } => {
                            let template = ids[template % ids.len()];
                            tree.fork_to_edit(template).and_then(|n| tree.finalize(n).map(|_| n))
                        }
                    };
                    if let Ok(id) = created {
                        ids.push(id);
                    }
                    prop_assert_eq!(tree.check_blocks(), Ok(()));
                }
                for block in tree.blocks() {
                    prop_assert!(block.len() >= 2);
                }
            }
        }
    }
}
