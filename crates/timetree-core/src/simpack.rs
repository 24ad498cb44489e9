//! The contract a simulation package ("simpack") fulfils for the core.
//!
//! The core never looks inside a state or a step profile. It needs a
//! state's optional clock, step-profile equality, and the ability to
//! advance a state according to the profile's [`StepKind`].

use std::fmt::Debug;

use crate::error::StepError;
use crate::history::HistoryView;

/// A simulation state stored in a tree node.
///
/// States cross thread boundaries when crunched in the background, so
/// they must be `Send + Sync + 'static`.
pub trait State: Clone + Send + Sync + 'static {
    /// The state's own simulation clock, if it carries one.
    ///
    /// When `None`, the tree synthesizes a clock: 0 for roots,
    /// `parent + 1` for children.
    fn clock(&self) -> Option<f64> {
        None
    }
}

/// An opaque "which evaluator with which parameters" bundle.
///
/// Only equality and cloning are ever used. Implemented automatically
/// for every type with the required bounds.
pub trait StepProfile: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T> StepProfile for T where T: Clone + PartialEq + Debug + Send + Sync + 'static {}

/// How a step profile advances a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// One state in, one state (or end) out.
    Simple,
    /// One state in, a cursor yielding a sequence of states out.
    Generator,
    /// Reads the timeline so far through a [`HistoryView`].
    HistoryDependent,
}

/// The result of advancing one step.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome<S> {
    /// A new state following the previous one.
    State(S),
    /// The simulation terminates here.
    End,
}

/// A cursor over the states produced by a generator step.
///
/// `None` means the cursor is exhausted, which crunchers treat the same
/// as [`StepOutcome::End`].
pub trait StepIterator<S>: Send {
    /// Produce the next outcome.
    fn next_step(&mut self) -> Option<Result<StepOutcome<S>, StepError>>;
}

/// A pluggable simulation package.
///
/// Implementors override the step methods matching the kinds that
/// [`step_kind`](Simpack::step_kind) can return; the defaults report
/// [`StepError::UnsupportedKind`].
pub trait Simpack: Send + Sync + 'static {
    /// The simulation state.
    type State: State;
    /// The step profile selecting an evaluator and its parameters.
    type Profile: StepProfile;

    /// Human-readable simpack name, used in diagnostics.
    fn name(&self) -> &str;

    /// The profile used when a node carries none (e.g. a from-scratch root).
    fn default_profile(&self) -> Self::Profile;

    /// Classify the evaluator selected by `profile`.
    fn step_kind(&self, profile: &Self::Profile) -> StepKind;

    /// Advance a state by one step ([`StepKind::Simple`]).
    fn step(
        &self,
        state: &Self::State,
        profile: &Self::Profile,
    ) -> Result<StepOutcome<Self::State>, StepError> {
        let _ = (state, profile);
        Err(StepError::UnsupportedKind(StepKind::Simple))
    }

    /// Start a step cursor from `state` ([`StepKind::Generator`]).
    fn generator(
        &self,
        state: &Self::State,
        profile: &Self::Profile,
    ) -> Result<Box<dyn StepIterator<Self::State>>, StepError> {
        let _ = (state, profile);
        Err(StepError::UnsupportedKind(StepKind::Generator))
    }

    /// Advance the timeline visible through `history`
    /// ([`StepKind::HistoryDependent`]).
    fn history_step(
        &self,
        history: &dyn HistoryView<Self::State>,
        profile: &Self::Profile,
    ) -> Result<StepOutcome<Self::State>, StepError> {
        let _ = (history, profile);
        Err(StepError::UnsupportedKind(StepKind::HistoryDependent))
    }
}

/// Resolve the clock of `state` given its parent's clock.
pub fn resolve_clock<S: State>(state: &S, parent_clock: Option<f64>) -> f64 {
    match (state.clock(), parent_clock) {
        (Some(clock), _) => clock,
        (None, Some(parent)) => parent + 1.0,
        (None, None) => 0.0,
    }
}
