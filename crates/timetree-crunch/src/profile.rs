//! Crunching profiles: how far a worker should run, and with what.

/// Instructions for a cruncher: a clock target plus the step profile to
/// advance with.
///
/// Compared by value. The type is mutable, so it is deliberately not
/// `Hash`; key containers on a job id instead.
#[derive(Clone, Debug, PartialEq)]
pub struct CrunchingProfile<P> {
    clock_target: f64,
    /// The evaluator and parameters. Changing it while a cruncher runs
    /// makes the manager replace that cruncher on the next sync.
    pub step_profile: P,
}

impl<P> CrunchingProfile<P> {
    /// Crunch with `step_profile` until a state's clock reaches
    /// `clock_target`.
    pub fn new(clock_target: f64, step_profile: P) -> Self {
        Self {
            clock_target,
            step_profile,
        }
    }

    /// The clock at which crunching stops.
    pub fn clock_target(&self) -> f64 {
        self.clock_target
    }

    /// Raise the clock target. Lower targets are ignored, so the target
    /// only ever grows.
    pub fn raise_clock_target(&mut self, clock_target: f64) {
        if clock_target > self.clock_target {
            self.clock_target = clock_target;
        }
    }

    /// Whether a state at `clock` needs no further crunching.
    pub fn state_satisfies(&self, clock: f64) -> bool {
        clock >= self.clock_target
    }
}
