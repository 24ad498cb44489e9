//! Read-only timeline access for history-dependent step functions.

use crate::error::HistoryError;
use crate::search::{Rounded, Rounding};

/// A linear view of "the timeline so far" as seen by one worker.
///
/// Index 0 is the oldest state; negative indices count back from the
/// newest (`-1` is the newest). Implementations decide where the states
/// live; the reader only sees one ordering.
pub trait HistoryView<S> {
    /// Number of states on the timeline.
    fn len(&self) -> Result<usize, HistoryError>;

    /// Whether the timeline holds no states.
    fn is_empty(&self) -> Result<bool, HistoryError> {
        Ok(self.len()? == 0)
    }

    /// The state at `index`.
    fn at(&self, index: isize) -> Result<S, HistoryError>;

    /// The newest state.
    fn last_state(&self) -> Result<S, HistoryError> {
        self.at(-1)
    }

    /// Binary search the timeline for `value` under a non-decreasing
    /// `f(state, clock)`.
    fn by_monotonic_function(
        &self,
        f: &dyn Fn(&S, f64) -> f64,
        value: f64,
        rounding: Rounding,
    ) -> Result<Rounded<S>, HistoryError>;

    /// Look a state up by its clock.
    fn by_clock(&self, clock: f64, rounding: Rounding) -> Result<Rounded<S>, HistoryError> {
        self.by_monotonic_function(&|_, c| c, clock, rounding)
    }
}
