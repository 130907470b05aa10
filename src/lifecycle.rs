//! Install-and-run lifecycle orchestration
//!
//! The controller composes the installer and the process supervisor behind
//! three intents (`run`, `stop`, `install`) and publishes the tri-state
//! lifecycle over a watch channel. All mutable state lives inside the
//! controller instance; the host observes it through `state`/`subscribe`
//! and the [`Frontend`] callbacks, never through ambient globals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{mpsc, watch};

use crate::config::SupervisorConfig;
use crate::frontend::Frontend;
use crate::install::platform::{self, InstallTarget, Platform};
use crate::install::{InstallCoordinator, InstallOutcome, paths};
use crate::supervisor::{DiagnosticSink, ProcessSupervisor, StartError};
use crate::workspace;

/// Consent prompt shown before an install-on-demand.
pub const INSTALL_PROMPT: &str = "Sanity is not installed. Install now?";

/// What the supervisor is currently doing. Advisory (drives the status
/// indicator); the mutual-exclusion guarantees live in the installer and
/// the process supervisor. Not persisted; resets to `Idle` on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Installing,
    Running,
}

/// Per-launch parameters, read fresh from configuration at every launch.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub port: u16,
    pub working_directory: Option<PathBuf>,
}

/// A launchable unit for the host's task registration point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTask {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

/// Construction-time wiring for [`LifecycleController`].
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Location of the supervisor config file.
    pub config_path: PathBuf,
    /// First workspace root, when one is available; becomes the server's
    /// working directory and the scope of the automatic trigger.
    pub workspace_root: Option<PathBuf>,
    /// Port override taking precedence over the configured port.
    pub port_override: Option<u16>,
    /// Release base override (mirrors); `None` means environment or the
    /// fixed upstream location.
    pub release_base: Option<String>,
}

/// Argument list the managed executable is launched with.
pub fn server_args(port: u16) -> Vec<String> {
    vec!["server".into(), "--port".into(), port.to_string()]
}

#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    options: ControllerOptions,
    frontend: Arc<dyn Frontend>,
    supervisor: ProcessSupervisor,
    installer: InstallCoordinator,
    state_tx: watch::Sender<LifecycleState>,
}

/// Routes the supervisor's stderr channel into the frontend.
struct FrontendSink(Arc<dyn Frontend>);

impl DiagnosticSink for FrontendSink {
    fn append(&self, line: &str) {
        self.0.append_diagnostic(line);
    }
}

impl LifecycleController {
    /// Must be called from within a tokio runtime: the exit observer runs
    /// as a spawned task.
    pub fn new(options: ControllerOptions, frontend: Arc<dyn Frontend>) -> Self {
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
        let sink = Arc::new(FrontendSink(Arc::clone(&frontend)));
        let supervisor = ProcessSupervisor::new(sink, exit_tx);
        let (state_tx, _) = watch::channel(LifecycleState::Idle);

        let inner = Arc::new(ControllerInner {
            options,
            frontend,
            supervisor,
            installer: InstallCoordinator::new(),
            state_tx,
        });

        // Exit observer: a child that goes away while Running flips the
        // state to Idle without any explicit stop. An exit observed while
        // Installing is the install's own stop-before-download; Installing
        // stays.
        let listener = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(notice) = exit_rx.recv().await {
                if listener.supervisor.is_running() {
                    // Stale notice from a process that was already replaced.
                    continue;
                }
                let changed = listener.state_tx.send_if_modified(|state| {
                    if *state == LifecycleState::Running {
                        *state = LifecycleState::Idle;
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    info!(
                        "sanity server stopped (pid {:?}, status {:?})",
                        notice.pid, notice.status
                    );
                    listener.frontend.state_changed(LifecycleState::Idle);
                }
            }
        });

        Self { inner }
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state_tx.borrow()
    }

    /// Watch lifecycle transitions; drives the host's status indicator.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state_tx.subscribe()
    }

    /// Run intent: launch the server, installing it first (with consent)
    /// when missing. Ignored while an install is in progress. All failures
    /// are surfaced through the frontend; none propagate.
    pub async fn run(&self) {
        let inner = &self.inner;
        if inner.installer.is_installing() {
            debug!("run ignored: install in progress");
            return;
        }

        let cfg = match inner.load_config() {
            Ok(cfg) => cfg,
            Err(e) => return inner.frontend.show_error(&format!("{e:#}")),
        };
        let executable = match inner.resolved_executable(&cfg) {
            Ok(path) => path,
            Err(e) => return inner.frontend.show_error(&format!("{e:#}")),
        };

        if executable.exists() {
            inner.start_server(&executable, &inner.run_config(&cfg));
            return;
        }

        if !inner.frontend.confirm_install(INSTALL_PROMPT) {
            debug!("install declined, staying idle");
            return;
        }
        if matches!(self.install().await, InstallOutcome::Installed) {
            // The path may have been reconfigured while the download ran;
            // resolve again rather than trusting the pre-install answer.
            let cfg = match inner.load_config() {
                Ok(cfg) => cfg,
                Err(e) => return inner.frontend.show_error(&format!("{e:#}")),
            };
            match inner.resolved_executable(&cfg) {
                Ok(path) => inner.start_server(&path, &inner.run_config(&cfg)),
                Err(e) => inner.frontend.show_error(&format!("{e:#}")),
            }
        }
    }

    /// Stop intent: safe no-op when nothing is running. Synchronous; the
    /// stopped transition is emitted by the exit observer once the child is
    /// reaped.
    pub fn stop(&self) {
        self.inner.supervisor.stop();
    }

    /// Install intent: single-flight, stops any running instance first.
    pub async fn install(&self) -> InstallOutcome {
        let inner = &self.inner;
        if inner.installer.is_installing() {
            debug!("install ignored: already installing");
            return InstallOutcome::AlreadyInstalling;
        }

        // The download overwrites the executable in place; running the old
        // binary while the new one is being written is unsafe. Stop happens
        // here, synchronously, before the install path first suspends.
        inner.supervisor.stop();
        inner.set_state(LifecycleState::Installing);

        let target = match inner.install_target() {
            Ok(target) => target,
            Err(e) => {
                inner.frontend.show_error(&format!("install failed: {e:#}"));
                inner.set_state(LifecycleState::Idle);
                return InstallOutcome::Failed(e);
            }
        };

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let progress_frontend = Arc::clone(&inner.frontend);
        let forwarder = tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                progress_frontend.report_progress(&progress);
            }
        });

        let outcome = inner.installer.request_install(target, progress_tx).await;
        // The sender is gone once request_install returns, so the forwarder
        // drains and finishes; waiting keeps progress ordered before the
        // terminal report.
        let _ = forwarder.await;

        if matches!(outcome, InstallOutcome::AlreadyInstalling) {
            // Lost a race with a concurrent request; that one owns the
            // state transitions.
            return outcome;
        }
        if let InstallOutcome::Failed(e) = &outcome {
            inner.frontend.show_error(&format!("install failed: {e:#}"));
        }
        inner.set_state(LifecycleState::Idle);
        outcome
    }

    /// Automatic trigger: best-effort one-shot content lookup in the
    /// workspace; a match issues the run intent. Never errors the host.
    pub async fn workspace_changed(&self) {
        let Some(root) = self.inner.options.workspace_root.clone() else {
            return;
        };
        if workspace::find_content_files(&root, 1).is_empty() {
            debug!("no sanity content under {}", root.display());
            return;
        }
        self.run().await;
    }

    /// Task registration point: the single launchable unit when the
    /// executable is installed, `None` otherwise. No side effects.
    pub fn provide_run_task(&self) -> Option<RunTask> {
        let inner = &self.inner;
        let cfg = inner.load_config().ok()?;
        let program = inner.resolved_executable(&cfg).ok()?;
        if !program.exists() {
            return None;
        }
        let run_cfg = inner.run_config(&cfg);
        Some(RunTask {
            program,
            args: server_args(run_cfg.port),
            working_directory: run_cfg.working_directory,
        })
    }
}

impl ControllerInner {
    fn load_config(&self) -> anyhow::Result<SupervisorConfig> {
        SupervisorConfig::load(&self.options.config_path)
    }

    fn resolved_executable(&self, cfg: &SupervisorConfig) -> anyhow::Result<PathBuf> {
        paths::resolve_executable(cfg.path.as_deref(), Platform::host())
    }

    fn run_config(&self, cfg: &SupervisorConfig) -> RunConfig {
        RunConfig {
            port: self.options.port_override.unwrap_or(cfg.port),
            working_directory: self.options.workspace_root.clone(),
        }
    }

    fn install_target(&self) -> anyhow::Result<InstallTarget> {
        let cfg = self.load_config()?;
        let platform = Platform::host();
        let local_path = paths::resolve_executable(cfg.path.as_deref(), platform)?;
        let base = platform::release_base(self.options.release_base.as_deref());
        Ok(InstallTarget::new(platform, &base, local_path))
    }

    fn start_server(&self, program: &Path, run_cfg: &RunConfig) {
        let args = server_args(run_cfg.port);
        match self
            .supervisor
            .start(program, &args, run_cfg.working_directory.as_deref())
        {
            Ok(()) => self.set_state(LifecycleState::Running),
            // A race in caller logic, not a user-facing condition.
            Err(StartError::AlreadyRunning) => debug!("start ignored: already running"),
            Err(e) => self.frontend.show_error(&e.to_string()),
        }
    }

    fn set_state(&self, next: LifecycleState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state != next {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            self.frontend.state_changed(next);
        }
    }
}
