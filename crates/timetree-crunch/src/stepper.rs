//! A uniform cursor over every [`StepKind`].

use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};
use timetree_core::{
    resolve_clock, HistoryView, Simpack, StepError, StepIterator, StepKind, StepOutcome,
};

use crate::error::CrunchError;
use crate::profile::CrunchingProfile;
use crate::queue::CrunchItem;

/// Messages from a cruncher handle to its running worker.
#[derive(Debug)]
pub(crate) enum Control<P> {
    Update(CrunchingProfile<P>),
    Retire,
}

/// Why [`Stepper::crunch`] returned.
#[derive(Debug)]
pub(crate) enum Finish {
    Retired,
    Ended,
    StepFailed(StepError),
    EmitFailed(CrunchError),
}

/// Drives a simpack forward from a starting state, one outcome at a
/// time, whatever kind of step function the profile selects.
///
/// Generator cursors are created lazily on the first advance and kept
/// for the stepper's lifetime, so in-place target changes never restart
/// them.
pub struct Stepper<Sp: Simpack> {
    simpack: Arc<Sp>,
    profile: Sp::Profile,
    kind: StepKind,
    state: Sp::State,
    clock: f64,
    cursor: Option<Box<dyn StepIterator<Sp::State>>>,
}

impl<Sp: Simpack> Stepper<Sp> {
    /// Start from `state` (at `clock`) stepping with `profile`, which
    /// was classified as `kind`.
    pub fn new(
        simpack: Arc<Sp>,
        state: Sp::State,
        clock: f64,
        profile: Sp::Profile,
        kind: StepKind,
    ) -> Self {
        Self {
            simpack,
            profile,
            kind,
            state,
            clock,
            cursor: None,
        }
    }

    /// The step kind being driven.
    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// The step profile being driven.
    pub fn profile(&self) -> &Sp::Profile {
        &self.profile
    }

    /// The most recent state.
    pub fn state(&self) -> &Sp::State {
        &self.state
    }

    /// The clock of the most recent state.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Produce the next outcome.
    ///
    /// History-dependent profiles need `history`; without it they fail
    /// with [`StepError::MissingHistory`]. An exhausted generator yields
    /// [`StepOutcome::End`].
    pub fn advance(
        &mut self,
        history: Option<&dyn HistoryView<Sp::State>>,
    ) -> Result<StepOutcome<Sp::State>, StepError> {
        let outcome = match self.kind {
            StepKind::Simple => self.simpack.step(&self.state, &self.profile)?,
            StepKind::Generator => {
                if self.cursor.is_none() {
                    self.cursor = Some(self.simpack.generator(&self.state, &self.profile)?);
                }
                match self.cursor.as_mut().and_then(|cursor| cursor.next_step()) {
                    Some(outcome) => outcome?,
                    None => StepOutcome::End,
                }
            }
            StepKind::HistoryDependent => {
                let history = history.ok_or(StepError::MissingHistory)?;
                self.simpack.history_step(history, &self.profile)?
            }
        };
        if let StepOutcome::State(state) = &outcome {
            self.clock = resolve_clock(state, Some(self.clock));
            self.state = state.clone();
        }
        Ok(outcome)
    }

    /// Step until retired, ended, failed, or until `profile` is satisfied
    /// with no further update able to arrive.
    ///
    /// While satisfied the loop blocks on `control` waiting for a raised
    /// target. A disconnected control channel is only final once the
    /// target is met.
    pub(crate) fn crunch(
        &mut self,
        mut profile: CrunchingProfile<Sp::Profile>,
        control: &Receiver<Control<Sp::Profile>>,
        history: Option<&dyn HistoryView<Sp::State>>,
        mut emit: impl FnMut(CrunchItem<Sp::State>) -> Result<(), CrunchError>,
    ) -> Finish {
        loop {
            match control.try_recv() {
                Ok(Control::Update(update)) => {
                    profile = update;
                    continue;
                }
                Ok(Control::Retire) => return Finish::Retired,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }
            if profile.state_satisfies(self.clock) {
                match control.recv() {
                    Ok(Control::Update(update)) => {
                        profile = update;
                        continue;
                    }
                    Ok(Control::Retire) | Err(_) => return Finish::Retired,
                }
            }
            let item = match self.advance(history) {
                Ok(StepOutcome::State(state)) => CrunchItem::State {
                    state,
                    clock: self.clock,
                },
                Ok(StepOutcome::End) => CrunchItem::End,
                Err(error) => return Finish::StepFailed(error),
            };
            let ended = matches!(item, CrunchItem::End);
            if let Err(error) = emit(item) {
                return Finish::EmitFailed(error);
            }
            if ended {
                return Finish::Ended;
            }
        }
    }
}
