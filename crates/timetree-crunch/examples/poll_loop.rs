//! Poll loop: crunch a small forked history in the background.
//!
//! Demonstrates:
//!   1. Building a tree with a root and an edited fork
//!   2. Asking the manager to keep a clock buffer ahead of the root
//!   3. Polling `sync_crunchers` until every branch is buffered
//!   4. Reading the result back through a path
//!
//! Run with:
//!   cargo run -p timetree-crunch --example poll_loop

use std::error::Error;
use std::thread;
use std::time::Duration;

use timetree_core::{Path, SharedTree, Tree};
use timetree_crunch::{CrunchingManager, ManagerConfig};
use timetree_test_utils::{Tally, TallyProfile, TallySimpack};

const BUFFER: f64 = 10.0;

fn main() -> Result<(), Box<dyn Error>> {
    let mut tree = Tree::new();
    let root = tree.add_state(Tally::new(0), None, None)?;
    let stepped = tree.add_state(Tally::new(1), Some(root), Some(TallyProfile::Add(1)))?;
    let edited = tree.fork_to_edit(stepped)?;
    tree.finalize(edited)?;

    let shared = SharedTree::new(tree);
    let mut manager = CrunchingManager::new(TallySimpack, shared, ManagerConfig::default())?;
    manager.ensure_buffer(root, BUFFER)?;

    let mut polls = 0;
    while manager.jobs().next().is_some() {
        let added = manager.sync_crunchers()?;
        polls += 1;
        if added > 0 {
            println!("poll {polls}: committed {added} states");
        }
        thread::sleep(Duration::from_millis(2));
    }

    let guard = manager.tree().read();
    let tree = &*guard;
    println!("{} nodes in {} blocks", tree.len(), tree.blocks().count());
    for leaf in tree.all_leaves(root, None)? {
        let mut path = Path::past(tree, leaf)?;
        let node = tree.node(leaf)?;
        println!(
            "leaf {leaf}: value {} at clock {} ({} nodes from the root)",
            node.state().value,
            node.clock(),
            path.len(tree)
        );
    }
    Ok(())
}
