//! Fixture simpacks and tree builders for timetree development.
//!
//! [`TallySimpack`] advances an integer counter. Its [`TallyProfile`]
//! variants cover every [`StepKind`], so one fixture drives tests for
//! simple, generator and history-dependent crunching alike.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use serde::{Deserialize, Serialize};
use timetree_core::{
    HistoryView, NodeId, Simpack, State, StepError, StepIterator, StepKind, StepOutcome, Tree,
};

/// A clockless counter state; the tree synthesizes its clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub value: i64,
}

impl Tally {
    pub fn new(value: i64) -> Self {
        Self { value }
    }
}

impl State for Tally {}

/// Step profiles understood by [`TallySimpack`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TallyProfile {
    /// Simple: add a constant each step.
    Add(i64),
    /// Simple: add a constant, ending the simulation once `at` is reached.
    Halt { add: i64, at: i64 },
    /// Generator: add `step` per yielded state, exhausting after `limit`
    /// states when set.
    Count { step: i64, limit: Option<u32> },
    /// History-dependent: each value is the sum of the previous two.
    Fibonacci,
    /// Simple: every step fails.
    Fail,
}

/// The counter simpack.
#[derive(Clone, Debug, Default)]
pub struct TallySimpack;

impl Simpack for TallySimpack {
    type State = Tally;
    type Profile = TallyProfile;

    fn name(&self) -> &str {
        "tally"
    }

    fn default_profile(&self) -> TallyProfile {
        TallyProfile::Add(1)
    }

    fn step_kind(&self, profile: &TallyProfile) -> StepKind {
        match profile {
            TallyProfile::Add(_) | TallyProfile::Halt { .. } | TallyProfile::Fail => {
                StepKind::Simple
            }
            TallyProfile::Count { .. } => StepKind::Generator,
            TallyProfile::Fibonacci => StepKind::HistoryDependent,
        }
    }

    fn step(&self, state: &Tally, profile: &TallyProfile) -> Result<StepOutcome<Tally>, StepError> {
        match *profile {
            TallyProfile::Add(n) => Ok(StepOutcome::State(Tally::new(state.value + n))),
            TallyProfile::Halt { at, .. } if state.value >= at => Ok(StepOutcome::End),
            TallyProfile::Halt { add, .. } => Ok(StepOutcome::State(Tally::new(state.value + add))),
            TallyProfile::Fail => Err(StepError::Failed {
                reason: "tally configured to fail".into(),
            }),
            _ => Err(StepError::UnsupportedKind(self.step_kind(profile))),
        }
    }

    fn generator(
        &self,
        state: &Tally,
        profile: &TallyProfile,
    ) -> Result<Box<dyn StepIterator<Tally>>, StepError> {
        match *profile {
            TallyProfile::Count { step, limit } => Ok(Box::new(CountCursor {
                value: state.value,
                step,
                remaining: limit,
            })),
            _ => Err(StepError::UnsupportedKind(StepKind::Generator)),
        }
    }

    fn history_step(
        &self,
        history: &dyn HistoryView<Tally>,
        profile: &TallyProfile,
    ) -> Result<StepOutcome<Tally>, StepError> {
        if *profile != TallyProfile::Fibonacci {
            return Err(StepError::UnsupportedKind(StepKind::HistoryDependent));
        }
        let last = history.at(-1)?.value;
        let before = if history.len()? >= 2 {
            history.at(-2)?.value
        } else {
            0
        };
        Ok(StepOutcome::State(Tally::new(last + before)))
    }
}

/// Cursor behind [`TallyProfile::Count`].
struct CountCursor {
    value: i64,
    step: i64,
    remaining: Option<u32>,
}

impl StepIterator<Tally> for CountCursor {
    fn next_step(&mut self) -> Option<Result<StepOutcome<Tally>, StepError>> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        self.value += self.step;
        Some(Ok(StepOutcome::State(Tally::new(self.value))))
    }
}

/// Build a single-root line of `len` tally nodes stepped with `profile`.
///
/// The root is untouched and profileless; its clock is 0 and each
/// following node's clock is one more than its parent's.
pub fn tally_line(len: usize, profile: TallyProfile) -> (Tree<Tally, TallyProfile>, Vec<NodeId>) {
    let mut tree = Tree::new();
    let mut nodes = Vec::with_capacity(len);
    if len == 0 {
        return (tree, nodes);
    }
    let root = tree
        .add_state(Tally::new(0), None, None)
        .expect("root insertion cannot fail");
    nodes.push(root);
    for i in 1..len {
        let parent = nodes[i - 1];
        let node = tree
            .add_state(Tally::new(i as i64), Some(parent), Some(profile.clone()))
            .expect("linear insertion cannot fail");
        nodes.push(node);
    }
    (tree, nodes)
}
