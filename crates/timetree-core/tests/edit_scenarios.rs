//! Integration test: editing a crunched line and navigating the result.

use timetree_core::{Path, Rounded, Rounding, Tree, TreeError};
use timetree_test_utils::{tally_line, Tally, TallyProfile};

#[test]
fn editing_mid_line_forks_and_splits_the_block() {
    let (mut tree, n) = tally_line(6, TallyProfile::Add(1));
    // The profileless root stays outside the run.
    assert_eq!(tree.blocks().count(), 1);
    assert_eq!(tree.node(n[0]).unwrap().block(), None);

    let edited = tree.fork_to_edit(n[3]).unwrap();
    assert_eq!(tree.node(edited).unwrap().parent(), Some(n[2]));
    assert_eq!(tree.node(edited).unwrap().template(), Some(n[3]));
    assert_eq!(tree.node(n[3]).unwrap().derived_nodes(), &[edited]);
    assert_eq!(tree.node(edited).unwrap().clock(), 3.0);

    let mut sizes: Vec<usize> = tree.blocks().map(|b| b.len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![2, 3]);
    tree.check_blocks().unwrap();
}

#[test]
fn edited_node_gains_children_only_after_finalize() {
    let (mut tree, n) = tally_line(4, TallyProfile::Add(1));
    let edited = tree.fork_to_edit(n[2]).unwrap();
    assert_eq!(
        tree.add_state(Tally::new(9), Some(edited), Some(TallyProfile::Add(1))),
        Err(TreeError::StillInEditing(edited))
    );

    tree.finalize(edited).unwrap();
    let child = tree
        .add_state(Tally::new(9), Some(edited), Some(TallyProfile::Add(1)))
        .unwrap();
    assert_eq!(tree.node(child).unwrap().clock(), 3.0);
    assert!(matches!(
        tree.finalize(edited),
        Err(TreeError::InvalidState { .. })
    ));
}

#[test]
fn newest_branch_wins_and_clock_lookups_follow_it() {
    let (mut tree, n) = tally_line(6, TallyProfile::Add(1));
    let edited = tree.fork_to_edit(n[3]).unwrap();
    tree.finalize(edited).unwrap();
    let child = tree
        .add_state(Tally::new(30), Some(edited), Some(TallyProfile::Add(1)))
        .unwrap();

    let mut newest = Path::containing(&tree, n[0]).unwrap();
    assert_eq!(newest.len(&tree), 5);
    assert_eq!(newest.last_node(&tree), Some(child));
    assert_eq!(
        newest.node_by_clock(&tree, 3.5, Rounding::Both, None),
        Ok(Rounded::Both {
            low: Some(edited),
            high: Some(child),
        })
    );

    let mut original = Path::containing(&tree, n[5]).unwrap();
    assert_eq!(original.len(&tree), 6);
    assert_eq!(
        original.node_by_clock(&tree, 3.5, Rounding::Low, None),
        Ok(Rounded::One(Some(n[3])))
    );
    assert_eq!(original.at(&tree, -1), Ok(n[5]));
}

#[test]
fn leaves_respect_the_clock_distance() {
    let (mut tree, n) = tally_line(6, TallyProfile::Add(1));
    let edited = tree.fork_to_edit(n[3]).unwrap();

    let mut all = tree.all_leaves(n[0], None).unwrap();
    all.sort();
    let mut expected = vec![n[5], edited];
    expected.sort();
    assert_eq!(all, expected);

    assert_eq!(tree.all_leaves(n[0], Some(4.0)).unwrap(), vec![edited]);
    assert_eq!(tree.all_leaves(n[5], Some(0.0)).unwrap(), vec![n[5]]);
}

#[test]
fn ends_are_recorded_per_node() {
    let mut tree: Tree<Tally, TallyProfile> = Tree::new();
    let root = tree.add_touched_state(Tally::new(0), None, false).unwrap();
    assert!(!tree.node(root).unwrap().has_end());
    tree.add_end(root, Some(TallyProfile::Add(1))).unwrap();
    assert!(tree.node(root).unwrap().has_end());
    assert_eq!(
        tree.add_end(timetree_core::NodeId(7), None),
        Err(TreeError::UnknownNode(timetree_core::NodeId(7)))
    );
}
