//! Process-backed crunchers and the worker side of their protocol.
//!
//! The coordinator talks to each worker process over its stdin/stdout
//! with newline-delimited JSON: [`WorkerCommand`]s go in,
//! [`WorkerEvent`]s come out. A worker binary only needs to call
//! [`serve_stdio`] with its simpack. History-dependent step functions
//! cannot run out of process.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use timetree_core::{Simpack, StepKind};
use tracing::{debug, warn};

use crate::cruncher::{Cruncher, CruncherSetup, CruncherType};
use crate::error::CrunchError;
use crate::profile::CrunchingProfile;
use crate::queue::{CrunchItem, OutputQueue};
use crate::stepper::{Control, Finish, Stepper};

/// Name of [`ProcessCruncherType`].
pub const PROCESS_CRUNCHER: &str = "process";

/// How often a reader whose pipe closed checks for the worker's exit.
const REAP_INTERVAL: Duration = Duration::from_millis(5);

// ── Protocol ────────────────────────────────────────────────────

/// A crunching profile as sent over the wire. JSON has no infinity, so
/// an unbounded clock target travels as `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireProfile<P> {
    /// The clock target, `None` when unbounded.
    pub clock_target: Option<f64>,
    /// The step profile.
    pub step_profile: P,
}

impl<P> From<CrunchingProfile<P>> for WireProfile<P> {
    fn from(profile: CrunchingProfile<P>) -> Self {
        let target = profile.clock_target();
        Self {
            clock_target: target.is_finite().then_some(target),
            step_profile: profile.step_profile,
        }
    }
}

impl<P> From<WireProfile<P>> for CrunchingProfile<P> {
    fn from(wire: WireProfile<P>) -> Self {
        CrunchingProfile::new(wire.clock_target.unwrap_or(f64::INFINITY), wire.step_profile)
    }
}

/// Coordinator to worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand<S, P> {
    /// Begin crunching from `state`. Always the first command.
    Start {
        /// The state to crunch from.
        state: S,
        /// Its resolved clock.
        clock: f64,
        /// How far to crunch.
        profile: WireProfile<P>,
    },
    /// Replace the crunching profile; the step profile is unchanged.
    UpdateProfile {
        /// The new profile.
        profile: WireProfile<P>,
    },
    /// Stop as soon as possible.
    Retire,
}

/// Worker to coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent<S> {
    /// A produced state.
    State {
        /// The state.
        state: S,
        /// Its resolved clock.
        clock: f64,
    },
    /// The simulation ended.
    End,
}

fn encode<T: Serialize>(message: &T) -> Result<String, CrunchError> {
    let mut line = serde_json::to_string(message).map_err(|e| CrunchError::Encoding {
        reason: e.to_string(),
    })?;
    line.push('\n');
    Ok(line)
}

// ── Config ──────────────────────────────────────────────────────

/// How to launch a worker process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessConfig {
    /// The worker executable.
    pub program: PathBuf,
    /// Arguments passed to every worker.
    pub args: Vec<OsString>,
}

impl ProcessConfig {
    /// Launch `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

// ── Coordinator side ────────────────────────────────────────────

/// Installs process-backed crunchers. Cannot run history-dependent
/// steps.
#[derive(Clone, Debug)]
pub struct ProcessCruncherType {
    config: ProcessConfig,
}

impl ProcessCruncherType {
    /// Crunchers launched per `config`.
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }
}

impl<Sp> CruncherType<Sp> for ProcessCruncherType
where
    Sp: Simpack,
    Sp::State: Serialize + DeserializeOwned,
    Sp::Profile: Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str {
        PROCESS_CRUNCHER
    }

    fn can_crunch(&self, kind: StepKind) -> bool {
        kind != StepKind::HistoryDependent
    }

    fn create(&self, setup: CruncherSetup<Sp>) -> Result<Box<dyn Cruncher<Sp>>, CrunchError> {
        Ok(Box::new(ProcessCruncher {
            config: self.config.clone(),
            step_profile: setup.crunching_profile.step_profile.clone(),
            output: setup.output,
            launch: Some((setup.state, setup.clock, setup.crunching_profile)),
            child: None,
            stdin: None,
            reader: None,
        }))
    }
}

/// A cruncher running in a child process.
pub struct ProcessCruncher<Sp: Simpack> {
    config: ProcessConfig,
    step_profile: Sp::Profile,
    output: OutputQueue<Sp::State>,
    launch: Option<(Sp::State, f64, CrunchingProfile<Sp::Profile>)>,
    /// Shared with the reader thread, which reaps the process.
    child: Option<Arc<Mutex<Option<Child>>>>,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
}

impl<Sp> ProcessCruncher<Sp>
where
    Sp: Simpack,
    Sp::State: Serialize + DeserializeOwned,
    Sp::Profile: Serialize + DeserializeOwned,
{
    fn send(&mut self, command: &WorkerCommand<Sp::State, Sp::Profile>) -> Result<(), CrunchError> {
        let line = encode(command)?;
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            CrunchError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "worker stdin is closed",
            ))
        })?;
        stdin.write_all(line.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }
}

impl<Sp> Cruncher<Sp> for ProcessCruncher<Sp>
where
    Sp: Simpack,
    Sp::State: Serialize + DeserializeOwned,
    Sp::Profile: Serialize + DeserializeOwned,
{
    fn start(&mut self) -> Result<(), CrunchError> {
        let (state, clock, profile) = self.launch.take().ok_or(CrunchError::AlreadyStarted)?;
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CrunchError::SpawnFailed {
                reason: format!("{}: {e}", self.config.program.display()),
            })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(CrunchError::SpawnFailed {
                reason: "worker pipes were not captured".into(),
            });
        };
        let pid = child.id();
        let child = Arc::new(Mutex::new(Some(child)));
        let output = self.output.clone();
        let reaped = Arc::clone(&child);
        let reader = thread::Builder::new()
            .name("timetree-process-reader".into())
            .spawn(move || {
                read_events(BufReader::new(stdout), &output);
                reap(&reaped);
            });
        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                if let Some(mut child) = child.lock().take() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                return Err(CrunchError::SpawnFailed {
                    reason: e.to_string(),
                });
            }
        };
        debug!(pid, "worker process started");
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.reader = Some(reader);
        self.send(&WorkerCommand::Start {
            state,
            clock,
            profile: profile.into(),
        })
    }

    fn retire(&mut self) {
        if self.stdin.is_some() {
            let _ = self.send(&WorkerCommand::Retire);
        }
        // Closing stdin also tells the worker nobody is listening.
        self.stdin = None;
    }

    fn update_crunching_profile(
        &mut self,
        profile: CrunchingProfile<Sp::Profile>,
    ) -> Result<(), CrunchError> {
        if profile.step_profile != self.step_profile {
            return Err(CrunchError::StepProfileChanged);
        }
        if let Some((_, _, launch_profile)) = self.launch.as_mut() {
            *launch_profile = profile;
            return Ok(());
        }
        self.send(&WorkerCommand::UpdateProfile {
            profile: profile.into(),
        })
    }

    fn is_alive(&self) -> bool {
        // The reader outlives the process until every line it wrote has
        // been queued and the process has been reaped.
        self.reader.as_ref().is_some_and(|reader| !reader.is_finished())
    }

    fn output(&self) -> &OutputQueue<Sp::State> {
        &self.output
    }
}

impl<Sp: Simpack> Drop for ProcessCruncher<Sp> {
    fn drop(&mut self) {
        // Never waits: the reader thread reaps the process and is left
        // detached.
        self.stdin = None;
        if let Some(child) = self.child.take() {
            if let Some(child) = child.lock().as_mut() {
                let _ = child.kill();
            }
        }
        self.reader = None;
    }
}

/// Poll `child` until it exits, then drop it. The lock is only held for
/// each non-blocking status check, so a concurrent kill is never
/// delayed.
fn reap(child: &Mutex<Option<Child>>) {
    loop {
        {
            let mut slot = child.lock();
            let Some(running) = slot.as_mut() else {
                return;
            };
            match running.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    debug!(%status, "worker process exited");
                    *slot = None;
                    return;
                }
                Err(error) => {
                    warn!(error = %error, "worker status unavailable");
                    *slot = None;
                    return;
                }
            }
        }
        thread::sleep(REAP_INTERVAL);
    }
}

/// Forward worker stdout into `output` until the pipe closes.
fn read_events<S: DeserializeOwned>(input: impl BufRead, output: &OutputQueue<S>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                warn!(error = %error, "worker stdout failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkerEvent<S>>(&line) {
            Ok(WorkerEvent::State { state, clock }) => output.push(CrunchItem::State { state, clock }),
            Ok(WorkerEvent::End) => output.push(CrunchItem::End),
            Err(error) => {
                warn!(error = %error, "unrecognized worker output");
                output.push(CrunchItem::Unrecognized(line));
            }
        }
    }
}

// ── Worker side ─────────────────────────────────────────────────

/// Run a worker over stdin/stdout until retired, ended, or done.
pub fn serve_stdio<Sp>(simpack: Sp) -> Result<(), CrunchError>
where
    Sp: Simpack,
    Sp::State: Serialize + DeserializeOwned,
    Sp::Profile: Serialize + DeserializeOwned,
{
    let stdin = BufReader::new(io::stdin());
    serve(simpack, stdin, io::stdout().lock())
}

/// Run a worker reading commands from `input` and writing events to
/// `output`.
///
/// Returns once retired, after an end, after a failed step, or once the
/// target is met and `input` is exhausted. EOF before `Start` is a
/// clean exit.
pub fn serve<Sp, R, W>(simpack: Sp, mut input: R, mut output: W) -> Result<(), CrunchError>
where
    Sp: Simpack,
    Sp::State: Serialize + DeserializeOwned,
    Sp::Profile: Serialize + DeserializeOwned,
    R: BufRead + Send + 'static,
    W: Write,
{
    let Some((state, clock, profile)) = read_start::<Sp, _>(&mut input)? else {
        return Ok(());
    };
    let simpack = Arc::new(simpack);
    let kind = simpack.step_kind(&profile.step_profile);
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("timetree-worker-commands".into())
        .spawn(move || forward_commands::<Sp::State, Sp::Profile>(input, &tx))
        .map_err(|e| CrunchError::SpawnFailed {
            reason: e.to_string(),
        })?;

    let mut stepper = Stepper::new(simpack, state, clock, profile.step_profile.clone(), kind);
    let finish = stepper.crunch(profile, &rx, None, |item| {
        let event = match item {
            CrunchItem::State { state, clock } => WorkerEvent::State { state, clock },
            CrunchItem::End => WorkerEvent::End,
            CrunchItem::Unrecognized(raw) => {
                return Err(CrunchError::Encoding {
                    reason: format!("cannot forward unrecognized item {raw}"),
                })
            }
        };
        output.write_all(encode(&event)?.as_bytes())?;
        output.flush()?;
        Ok(())
    });
    match finish {
        Finish::Retired | Finish::Ended => Ok(()),
        Finish::StepFailed(error) => {
            warn!(error = %error, clock = stepper.clock(), "step failed; worker exiting");
            Ok(())
        }
        Finish::EmitFailed(error) => Err(error),
    }
}

type Launch<S, P> = (S, f64, CrunchingProfile<P>);

fn read_start<Sp, R>(input: &mut R) -> Result<Option<Launch<Sp::State, Sp::Profile>>, CrunchError>
where
    Sp: Simpack,
    Sp::State: DeserializeOwned,
    Sp::Profile: DeserializeOwned,
    R: BufRead,
{
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        let command: WorkerCommand<Sp::State, Sp::Profile> =
            serde_json::from_str(&line).map_err(|e| CrunchError::Encoding {
                reason: e.to_string(),
            })?;
        return match command {
            WorkerCommand::Start {
                state,
                clock,
                profile,
            } => Ok(Some((state, clock, profile.into()))),
            WorkerCommand::Retire => Ok(None),
            WorkerCommand::UpdateProfile { .. } => Err(CrunchError::Encoding {
                reason: "profile update before start".into(),
            }),
        };
    }
}

fn forward_commands<S, P>(input: impl BufRead, tx: &Sender<Control<P>>)
where
    S: DeserializeOwned,
    P: DeserializeOwned,
{
    for line in input.lines() {
        let Ok(line) = line else { return };
        if line.trim().is_empty() {
            continue;
        }
        let control = match serde_json::from_str::<WorkerCommand<S, P>>(&line) {
            Ok(WorkerCommand::UpdateProfile { profile }) => Control::Update(profile.into()),
            Ok(WorkerCommand::Retire) => Control::Retire,
            Ok(WorkerCommand::Start { .. }) => {
                warn!("duplicate start command ignored");
                continue;
            }
            Err(error) => {
                warn!(error = %error, "unrecognized command ignored");
                continue;
            }
        };
        let retire = matches!(control, Control::Retire);
        if tx.send(control).is_err() || retire {
            return;
        }
    }
}
