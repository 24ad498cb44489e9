//! Thread-backed crunchers.
//!
//! Each cruncher owns one OS thread driving a [`Stepper`]. Profile
//! updates and the retire request travel over an unbounded crossbeam
//! channel, drained between steps.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use timetree_core::{HistoryError, HistoryView, Simpack, StepError, StepKind};
use tracing::{debug, warn};

use crate::cruncher::{Cruncher, CruncherSetup, CruncherType};
use crate::error::CrunchError;
use crate::history::HistoryBrowser;
use crate::profile::CrunchingProfile;
use crate::queue::OutputQueue;
use crate::stepper::{Control, Finish, Stepper};

/// Name of [`ThreadCruncherType`].
pub const THREAD_CRUNCHER: &str = "thread";

/// Installs thread-backed crunchers. Supports every step kind.
#[derive(Clone, Copy, Debug)]
pub struct ThreadCruncherType {
    name: &'static str,
}

impl ThreadCruncherType {
    /// The standard thread cruncher type, named [`THREAD_CRUNCHER`].
    pub fn new() -> Self {
        Self::named(THREAD_CRUNCHER)
    }

    /// A thread cruncher type under another name, for installing two
    /// distinguishable thread-backed types side by side.
    pub fn named(name: &'static str) -> Self {
        Self { name }
    }
}

impl Default for ThreadCruncherType {
    fn default() -> Self {
        Self::new()
    }
}

impl<Sp: Simpack> CruncherType<Sp> for ThreadCruncherType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn can_crunch(&self, _kind: StepKind) -> bool {
        true
    }

    fn create(&self, setup: CruncherSetup<Sp>) -> Result<Box<dyn Cruncher<Sp>>, CrunchError> {
        Ok(Box::new(ThreadCruncher::new(self.name, setup)))
    }
}

/// A cruncher running on its own thread.
pub struct ThreadCruncher<Sp: Simpack> {
    name: &'static str,
    step_profile: Sp::Profile,
    output: OutputQueue<Sp::State>,
    control: Sender<Control<Sp::Profile>>,
    launch: Option<Launch<Sp>>,
    handle: Option<JoinHandle<()>>,
}

/// What the thread needs, held until `start`.
struct Launch<Sp: Simpack> {
    setup: CruncherSetup<Sp>,
    control: Receiver<Control<Sp::Profile>>,
}

impl<Sp: Simpack> ThreadCruncher<Sp> {
    fn new(name: &'static str, setup: CruncherSetup<Sp>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            name,
            step_profile: setup.crunching_profile.step_profile.clone(),
            output: setup.output.clone(),
            control: tx,
            launch: Some(Launch { setup, control: rx }),
            handle: None,
        }
    }
}

impl<Sp: Simpack> Cruncher<Sp> for ThreadCruncher<Sp> {
    fn start(&mut self) -> Result<(), CrunchError> {
        let launch = self.launch.take().ok_or(CrunchError::AlreadyStarted)?;
        let handle = thread::Builder::new()
            .name(format!("timetree-{}", self.name))
            .spawn(move || run(launch))
            .map_err(|e| CrunchError::SpawnFailed {
                reason: e.to_string(),
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn retire(&mut self) {
        // The worker may already be gone; a closed channel is fine.
        let _ = self.control.send(Control::Retire);
    }

    fn update_crunching_profile(
        &mut self,
        profile: CrunchingProfile<Sp::Profile>,
    ) -> Result<(), CrunchError> {
        if profile.step_profile != self.step_profile {
            return Err(CrunchError::StepProfileChanged);
        }
        match self.launch.as_mut() {
            Some(launch) => launch.setup.crunching_profile = profile,
            None => {
                let _ = self.control.send(Control::Update(profile));
            }
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn output(&self) -> &OutputQueue<Sp::State> {
        &self.output
    }
}

impl<Sp: Simpack> Drop for ThreadCruncher<Sp> {
    fn drop(&mut self) {
        // Not joined: a worker mid-step finishes on its own.
        self.retire();
    }
}

fn run<Sp: Simpack>(launch: Launch<Sp>) {
    let Launch { setup, control } = launch;
    let profile = setup.crunching_profile;
    let mut stepper = Stepper::new(
        setup.simpack,
        setup.state,
        setup.clock,
        profile.step_profile.clone(),
        setup.step_kind,
    );
    let output = setup.output;
    let browser = HistoryBrowser::new(setup.tree, setup.assignment, output.clone());
    let history = match stepper.kind() {
        StepKind::HistoryDependent => Some(&browser as &dyn HistoryView<Sp::State>),
        _ => None,
    };
    let finish = stepper.crunch(profile, &control, history, |item| {
        output.push(item);
        Ok(())
    });
    match finish {
        Finish::Retired | Finish::Ended => {}
        Finish::StepFailed(StepError::History(HistoryError::ObsoleteWorker)) => {
            debug!("obsolete history; cruncher stopping");
        }
        Finish::StepFailed(error) => {
            warn!(error = %error, clock = stepper.clock(), "step failed; cruncher stopping");
        }
        Finish::EmitFailed(error) => {
            warn!(error = %error, "cruncher output failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use timetree_core::{NodeId, SharedTree, Tree};
    use timetree_test_utils::{Tally, TallyProfile, TallySimpack};

    use crate::queue::{Assignment, CrunchItem};

    fn setup(profile: CrunchingProfile<TallyProfile>) -> CruncherSetup<TallySimpack> {
        let mut tree = Tree::new();
        let root = tree.add_state(Tally::new(0), None, None).unwrap();
        CruncherSetup {
            simpack: Arc::new(TallySimpack),
            tree: SharedTree::new(tree),
            state: Tally::new(0),
            clock: 0.0,
            step_kind: TallySimpack.step_kind(&profile.step_profile),
            crunching_profile: profile,
            assignment: Arc::new(Assignment::new(root)),
            output: OutputQueue::new(),
        }
    }

    fn collect_until(queue: &OutputQueue<Tally>, count: usize) -> Vec<CrunchItem<Tally>> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut items = Vec::new();
        while items.len() < count && Instant::now() < deadline {
            items.extend(queue.take_available());
            thread::sleep(Duration::from_millis(1));
        }
        items
    }

    #[test]
    fn crunches_to_target_then_idles() {
        let mut cruncher =
            ThreadCruncher::new(THREAD_CRUNCHER, setup(CrunchingProfile::new(3.0, TallyProfile::Add(1))));
        cruncher.start().unwrap();
        let items = collect_until(cruncher.output(), 3);
        let values: Vec<i64> = items
            .iter()
            .map(|item| match item {
                CrunchItem::State { state, .. } => state.value,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert!(cruncher.is_alive());

        cruncher
            .update_crunching_profile(CrunchingProfile::new(5.0, TallyProfile::Add(1)))
            .unwrap();
        assert_eq!(collect_until(cruncher.output(), 2).len(), 2);
        cruncher.retire();
        let deadline = Instant::now() + Duration::from_secs(10);
        while cruncher.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!cruncher.is_alive());
    }

    #[test]
    fn end_stops_the_worker() {
        let profile = CrunchingProfile::new(f64::INFINITY, TallyProfile::Halt { add: 1, at: 2 });
        let mut cruncher = ThreadCruncher::new(THREAD_CRUNCHER, setup(profile));
        cruncher.start().unwrap();
        let items = collect_until(cruncher.output(), 3);
        assert_eq!(items.last(), Some(&CrunchItem::End));
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn step_profile_cannot_change_in_place() {
        let mut cruncher =
            ThreadCruncher::new(THREAD_CRUNCHER, setup(CrunchingProfile::new(1.0, TallyProfile::Add(1))));
        let update = CrunchingProfile::new(1.0, TallyProfile::Add(2));
        assert!(matches!(
            cruncher.update_crunching_profile(update),
            Err(CrunchError::StepProfileChanged)
        ));
        assert!(!cruncher.is_alive());
        cruncher.start().unwrap();
        assert!(matches!(cruncher.start(), Err(CrunchError::AlreadyStarted)));
    }

    #[test]
    fn failing_step_stops_without_output() {
        let mut cruncher =
            ThreadCruncher::new(THREAD_CRUNCHER, setup(CrunchingProfile::new(5.0, TallyProfile::Fail)));
        cruncher.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while cruncher.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!cruncher.is_alive());
        assert!(cruncher.output().is_empty());
    }

    #[test]
    fn obsolete_history_stops_quietly() {
        let mut config = setup(CrunchingProfile::new(f64::INFINITY, TallyProfile::Fibonacci));
        config.assignment = Arc::new(Assignment::new(NodeId(0)));
        config.assignment.clear();
        let mut cruncher = ThreadCruncher::new(THREAD_CRUNCHER, config);
        cruncher.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while cruncher.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!cruncher.is_alive());
        assert!(cruncher.output().is_empty());
    }
}
