//! The single-producer output queue between a cruncher and the manager,
//! and the shared assignment cell that tells a worker where its job is.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use timetree_core::NodeId;

// ── CrunchItem ──────────────────────────────────────────────────

/// One item produced by a cruncher.
#[derive(Clone, Debug, PartialEq)]
pub enum CrunchItem<S> {
    /// A newly crunched state with its resolved clock.
    State {
        /// The produced state.
        state: S,
        /// The clock the tree will assign it.
        clock: f64,
    },
    /// The simulation ended after the previous state.
    End,
    /// Output the cruncher could not decode. Never valid to commit.
    Unrecognized(String),
}

// ── OutputQueue ─────────────────────────────────────────────────

/// FIFO of [`CrunchItem`]s. Cloning shares the queue.
///
/// The cruncher's worker is the only producer and the manager the only
/// consumer; the worker's own [`HistoryBrowser`](crate::history::HistoryBrowser)
/// may additionally peek at pending states.
pub struct OutputQueue<S> {
    items: Arc<Mutex<VecDeque<CrunchItem<S>>>>,
}

impl<S> Clone for OutputQueue<S> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<S> Default for OutputQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> OutputQueue<S> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Append an item.
    pub fn push(&self, item: CrunchItem<S>) {
        self.items.lock().push_back(item);
    }

    /// Remove and return everything available right now, oldest first.
    /// Never waits for more.
    pub fn take_available(&self) -> Vec<CrunchItem<S>> {
        self.items.lock().drain(..).collect()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<S: Clone> OutputQueue<S> {
    /// Snapshot the queued states with their clocks, oldest first.
    pub fn pending(&self) -> Vec<(S, f64)> {
        self.items
            .lock()
            .iter()
            .filter_map(|item| match item {
                CrunchItem::State { state, clock } => Some((state.clone(), *clock)),
                _ => None,
            })
            .collect()
    }
}

// ── Assignment ──────────────────────────────────────────────────

/// Sentinel meaning "no job owns this worker any more."
pub const UNASSIGNED: u64 = u64::MAX;

/// The node a worker's job has been committed up to.
///
/// The manager moves it forward under the tree's write lock while
/// draining, and clears it when the worker is retired.
#[derive(Debug)]
pub struct Assignment {
    node: AtomicU64,
}

// Compile-time assertion: queues and assignments cross into worker
// threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<OutputQueue<u64>>();
    assert::<Assignment>();
};

impl Assignment {
    /// Assign to `node`.
    pub fn new(node: NodeId) -> Self {
        Self {
            node: AtomicU64::new(u64::from(node.0)),
        }
    }

    /// The currently assigned node, or `None` once retired.
    pub fn node(&self) -> Option<NodeId> {
        match self.node.load(Ordering::Acquire) {
            UNASSIGNED => None,
            raw => u32::try_from(raw).ok().map(NodeId),
        }
    }

    /// Move the assignment to `node`.
    pub fn assign(&self, node: NodeId) {
        self.node.store(u64::from(node.0), Ordering::Release);
    }

    /// Mark the worker obsolete.
    pub fn clear(&self) {
        self.node.store(UNASSIGNED, Ordering::Release);
    }
}
