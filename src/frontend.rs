//! Host-environment collaborators behind one interface
//!
//! The supervisor core never talks to a terminal (or any other UI) directly;
//! everything user-facing goes through [`Frontend`]. The shipped
//! implementation is the terminal one below; tests substitute a recording
//! implementation.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use inquire::Confirm;
use log::{error, info};

use crate::install::download::DownloadProgress;
use crate::lifecycle::LifecycleState;

pub trait Frontend: Send + Sync {
    /// Gate install-on-demand. Returns whether the user consented.
    fn confirm_install(&self, message: &str) -> bool;

    /// Incremental notification during an install.
    fn report_progress(&self, progress: &DownloadProgress);

    /// User-visible failure message for the current operation.
    fn show_error(&self, message: &str);

    /// Status indicator: the lifecycle state changed.
    fn state_changed(&self, state: LifecycleState);

    /// Append-only diagnostic channel fed from the server's stderr.
    fn append_diagnostic(&self, line: &str);
}

/// Terminal implementation: inquire for consent, indicatif for progress,
/// the log facade for status and diagnostics.
pub struct TerminalFrontend {
    assume_yes: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalFrontend {
    /// `assume_yes` skips the consent prompt (for `--yes` and other
    /// non-interactive invocations).
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            bar: Mutex::new(None),
        }
    }
}

impl Frontend for TerminalFrontend {
    fn confirm_install(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        // An aborted or unanswerable prompt counts as a decline.
        Confirm::new(message)
            .with_default(true)
            .prompt()
            .unwrap_or(false)
    }

    fn report_progress(&self, progress: &DownloadProgress) {
        let mut slot = self.bar.lock().unwrap();
        let bar = slot.get_or_insert_with(|| match progress.total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) =
                    ProgressStyle::default_bar().template("[{bar:50.green/blue}] {bytes}/{total_bytes}")
                {
                    bar.set_style(style.progress_chars("█▓░"));
                }
                bar
            }
            // No content-length: the fraction is indeterminate, show a
            // spinner with the byte count instead of a fake percentage.
            None => {
                let bar = ProgressBar::new_spinner();
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        });
        bar.set_position(progress.bytes_read);
        if progress.total_bytes.is_none() {
            bar.set_message(format!("{} downloaded", HumanBytes(progress.bytes_read)));
        }
    }

    fn show_error(&self, message: &str) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
        error!("{message}");
    }

    fn state_changed(&self, state: LifecycleState) {
        if state != LifecycleState::Installing {
            if let Some(bar) = self.bar.lock().unwrap().take() {
                bar.finish_and_clear();
            }
        }
        match state {
            LifecycleState::Installing => info!("sanity: installing"),
            LifecycleState::Running => info!("sanity: running (Ctrl-C to stop)"),
            LifecycleState::Idle => info!("sanity: idle"),
        }
    }

    fn append_diagnostic(&self, line: &str) {
        info!(target: "sanity", "{line}");
    }
}
