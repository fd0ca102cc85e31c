// ─── Launch Pipeline ───
// Sequences install → build-command → spawn → stream → finish on a worker
// thread, streaming status/progress/log events back to the controller.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::error::{LauncherError, LauncherResult};
use crate::install::{Installer, LaunchOptions, LoaderKind};
use crate::job::{CancellationToken, JobHandle, JobRunner, ProgressSink};
use crate::process::{ProcessKiller, ProcessSupervisor};
use crate::settings::SettingsStore;

/// Everything one launch needs. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub version: String,
    pub loader: LoaderKind,
    pub options: LaunchOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    InstallingGame,
    InstallingLoader,
    BuildingCommand,
    Launching,
    Running,
    Completed { success: bool, message: String },
    Cancelled,
    Failed { reason: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed { .. } | PipelineState::Cancelled | PipelineState::Failed { .. }
        )
    }
}

/// Controller-facing event stream. Exactly one `Completed` terminates a run;
/// no pipeline events follow it.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchEvent {
    Status(String),
    /// `max == 0` means indeterminate.
    Progress { value: u64, max: u64 },
    Log(String),
    Completed { success: bool, message: String },
}

struct EventSink {
    events: mpsc::UnboundedSender<LaunchEvent>,
}

impl ProgressSink for EventSink {
    fn set_status(&self, text: &str) {
        let _ = self.events.send(LaunchEvent::Status(text.into()));
    }

    fn set_progress(&self, value: u64, max: u64) {
        let _ = self.events.send(LaunchEvent::Progress { value, max });
    }
}

type KillerSlot = Arc<Mutex<Option<ProcessKiller>>>;

/// Handle to one in-flight (or finished) launch run.
pub struct PipelineHandle {
    events: mpsc::UnboundedReceiver<LaunchEvent>,
    state: watch::Receiver<PipelineState>,
    token: CancellationToken,
    killer: KillerSlot,
    job: Option<JobHandle<String>>,
}

impl PipelineHandle {
    fn start(
        request: LaunchRequest,
        installer: Arc<dyn Installer>,
        game_dir: PathBuf,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let killer: KillerSlot = Arc::default();

        let worker_killer = killer.clone();
        let job = JobRunner::run_blocking(events_tx, move |token, events| {
            let outcome = run_stages(
                &request,
                installer.as_ref(),
                &game_dir,
                token,
                events,
                &state_tx,
                &worker_killer,
            );
            *slot_lock(&worker_killer) = None;

            let (state, success, message) = match &outcome {
                Ok(message) => (
                    PipelineState::Completed {
                        success: true,
                        message: message.clone(),
                    },
                    true,
                    message.clone(),
                ),
                Err(LauncherError::Cancelled) => {
                    let message = LauncherError::Cancelled.to_string();
                    let _ = events.send(LaunchEvent::Status("Cancelling...".into()));
                    (PipelineState::Cancelled, false, message)
                }
                Err(err) => {
                    let message = format!("An error occurred: {err}");
                    warn!("Launch pipeline failed: {err}");
                    let _ = events.send(LaunchEvent::Status(message.clone()));
                    (
                        PipelineState::Failed {
                            reason: message.clone(),
                        },
                        false,
                        message,
                    )
                }
            };

            state_tx.send_replace(state);
            let _ = events.send(LaunchEvent::Completed { success, message });
            outcome
        });

        let token = job.token();
        Self {
            events: events_rx,
            state: state_rx,
            token,
            killer,
            job: Some(job),
        }
    }

    /// Next event from the run. Events are delivered here, on the
    /// controller's side, never on the worker thread.
    pub async fn recv(&mut self) -> Option<LaunchEvent> {
        self.events.recv().await
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Request cancellation of the run. Idempotent; a call after completion
    /// is a no-op. Terminates any owned process so blocked reads unwind
    /// promptly; the worker acknowledges with a "Cancelling..." status
    /// before its terminal `Completed`.
    pub fn request_cancel(&self) {
        if self.is_terminal() || self.token.is_cancelled() {
            return;
        }
        info!("Cancellation requested for launch pipeline");
        self.token.cancel();
        if let Some(killer) = slot_lock(&self.killer).as_ref() {
            killer.terminate();
        }
    }

    /// Wait for the worker's terminal outcome.
    pub async fn join(mut self) -> LauncherResult<String> {
        match self.job.take() {
            Some(job) => job.join().await,
            None => Err(LauncherError::Other("pipeline already joined".into())),
        }
    }
}

/// Controller-side slot enforcing the one-active-run policy: a new request
/// may not start while the previous one is still non-terminal.
pub struct LaunchPipeline {
    installer: Arc<dyn Installer>,
    active: Option<PipelineHandle>,
}

impl LaunchPipeline {
    pub fn new(installer: Arc<dyn Installer>) -> Self {
        Self {
            installer,
            active: None,
        }
    }

    pub fn start(
        &mut self,
        request: LaunchRequest,
        store: &SettingsStore,
    ) -> LauncherResult<&mut PipelineHandle> {
        if let Some(active) = &self.active {
            if !active.is_terminal() {
                return Err(LauncherError::Other(
                    "a launch is already in progress".into(),
                ));
            }
        }

        info!(
            "Starting launch pipeline for {} ({})",
            request.version, request.loader
        );
        let game_dir = store.game_dir(&request.version);
        let handle = PipelineHandle::start(request, self.installer.clone(), game_dir);
        Ok(self.active.insert(handle))
    }

    pub fn active(&self) -> Option<&PipelineHandle> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut PipelineHandle> {
        self.active.as_mut()
    }

    pub fn take_active(&mut self) -> Option<PipelineHandle> {
        self.active.take()
    }

    pub fn request_cancel(&self) {
        if let Some(active) = &self.active {
            active.request_cancel();
        }
    }
}

/// The stage machine proper. Runs on the worker thread; the token is checked
/// before every state transition and before every blocking read.
fn run_stages(
    request: &LaunchRequest,
    installer: &dyn Installer,
    game_dir: &Path,
    token: &CancellationToken,
    events: &mpsc::UnboundedSender<LaunchEvent>,
    state: &watch::Sender<PipelineState>,
    killer_slot: &KillerSlot,
) -> LauncherResult<String> {
    let sink = EventSink {
        events: events.clone(),
    };

    enter(state, token, PipelineState::InstallingGame)?;
    sink.set_status(&format!("Installing Minecraft {}...", request.version));
    installer.install_game(&request.version, &sink, token)?;

    let mut version_to_launch = request.version.clone();
    if request.loader != LoaderKind::Vanilla {
        enter(state, token, PipelineState::InstallingLoader)?;
        if !request.loader.install_supported() {
            return Err(LauncherError::UnsupportedLoader(
                request.loader.name().into(),
            ));
        }
        sink.set_status(&format!("Installing {}...", request.loader));
        version_to_launch =
            installer.install_loader(request.loader, &request.version, &sink, token)?;
    }
    sink.set_progress(1, 1);

    enter(state, token, PipelineState::BuildingCommand)?;
    sink.set_status("Getting launch command...");
    sink.set_progress(0, 0);

    std::fs::create_dir_all(game_dir).map_err(|e| LauncherError::io(game_dir, e))?;
    let mut options = request.options.sanitized();
    options.game_directory = Some(game_dir.to_path_buf());
    info!("Launching with game directory: {:?}", game_dir);
    let command = installer.build_command(&version_to_launch, &options)?;

    enter(state, token, PipelineState::Launching)?;
    sink.set_status("Launching game...");
    sink.set_progress(0, 0);
    let supervisor = ProcessSupervisor::spawn(&command)?;
    *slot_lock(killer_slot) = Some(supervisor.killer());
    // Handshake with the cancel path: the controller sets the token first,
    // then terminates through the slot. Publishing the killer before this
    // check guarantees a concurrent cancel is acted on by at least one side.
    if token.is_cancelled() {
        supervisor.killer().terminate();
    }

    let streamed = stream_output(&supervisor, token, events, state);
    if streamed.is_err() {
        // Terminate is idempotent; the controller may already have fired it.
        supervisor.killer().terminate();
    }
    supervisor.wait();
    streamed?;

    token.checkpoint()?;
    sink.set_status("Game closed.");
    Ok("Game closed.".into())
}

/// Stream the child's merged output until it exits or the run is cancelled.
/// Every exit from this region, `Ok` or `Err`, is followed by the caller
/// reaping the child; the `Err` exits are preceded by a terminate.
fn stream_output(
    supervisor: &ProcessSupervisor,
    token: &CancellationToken,
    events: &mpsc::UnboundedSender<LaunchEvent>,
    state: &watch::Sender<PipelineState>,
) -> LauncherResult<()> {
    enter(state, token, PipelineState::Running)?;
    for line in supervisor.lines() {
        if token.is_cancelled() {
            break;
        }
        let _ = events.send(LaunchEvent::Log(line));
    }
    token.checkpoint()
}

fn enter(
    state: &watch::Sender<PipelineState>,
    token: &CancellationToken,
    next: PipelineState,
) -> LauncherResult<()> {
    token.checkpoint()?;
    state.send_replace(next);
    Ok(())
}

fn slot_lock(slot: &KillerSlot) -> std::sync::MutexGuard<'_, Option<ProcessKiller>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
