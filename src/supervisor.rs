//! Child-process supervision for the managed server
//!
//! At most one server process is tracked at a time. `start` spawns the
//! executable with stderr piped into a [`DiagnosticSink`]; a wait task acts
//! as the exit observer and fires exactly once per started process, whether
//! the child was stopped externally or died on its own. `stop` clears the
//! tracked entry immediately and leaves the kill/reap to the wait task, so
//! callers never block on exit confirmation.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

/// Append-only text channel receiving the managed process's stderr output.
pub trait DiagnosticSink: Send + Sync {
    fn append(&self, line: &str);
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("the sanity server is already running")]
    AlreadyRunning,

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Emitted once per started process when it is gone, from whatever cause.
#[derive(Debug)]
pub struct ExitNotice {
    pub pid: Option<u32>,
    pub status: Option<std::process::ExitStatus>,
}

struct TrackedProcess {
    pid: Option<u32>,
    generation: u64,
    stop: oneshot::Sender<()>,
}

pub struct ProcessSupervisor {
    tracked: Arc<Mutex<Option<TrackedProcess>>>,
    exits: mpsc::UnboundedSender<ExitNotice>,
    diagnostics: Arc<dyn DiagnosticSink>,
    generation: AtomicU64,
}

impl ProcessSupervisor {
    /// `exits` receives one [`ExitNotice`] per started process; `diagnostics`
    /// receives its stderr line by line.
    pub fn new(
        diagnostics: Arc<dyn DiagnosticSink>,
        exits: mpsc::UnboundedSender<ExitNotice>,
    ) -> Self {
        Self {
            tracked: Arc::new(Mutex::new(None)),
            exits,
            diagnostics,
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.tracked.lock().unwrap().is_some()
    }

    /// Launch `program` with `args` in `cwd`. Fails with
    /// [`StartError::AlreadyRunning`] when a process is already tracked; a
    /// second instance is never spawned.
    ///
    /// Must be called from within a tokio runtime (the stderr reader and the
    /// exit observer are spawned tasks).
    pub fn start(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<(), StartError> {
        let mut tracked = self.tracked.lock().unwrap();
        if tracked.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| StartError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        let pid = child.id();
        info!("started sanity server (pid {pid:?})");

        if let Some(stderr) = child.stderr.take() {
            let sink = Arc::clone(&self.diagnostics);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink.append(&line);
                }
            });
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *tracked = Some(TrackedProcess {
            pid,
            generation,
            stop: stop_tx,
        });
        drop(tracked);

        let slot = Arc::clone(&self.tracked);
        let exits = self.exits.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status.ok(),
                // Fires on an explicit stop() and also when the supervisor
                // itself is dropped with the child still alive.
                _ = stop_rx => {
                    let _ = child.start_kill();
                    child.wait().await.ok()
                }
            };
            debug!("sanity server exited (pid {pid:?}, status {status:?})");

            // stop() may have cleared the slot already; only remove our own
            // entry.
            {
                let mut tracked = slot.lock().unwrap();
                if tracked.as_ref().is_some_and(|p| p.generation == generation) {
                    *tracked = None;
                }
            }
            let _ = exits.send(ExitNotice { pid, status });
        });

        Ok(())
    }

    /// Signal the tracked process to terminate and forget it immediately.
    /// No-op when nothing is tracked. The wait task reaps the child and
    /// emits the exit notice asynchronously.
    pub fn stop(&self) {
        let tracked = self.tracked.lock().unwrap().take();
        if let Some(process) = tracked {
            info!("stopping sanity server (pid {:?})", process.pid);
            let _ = process.stop.send(());
        }
    }
}
