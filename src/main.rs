use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use sanityd::cli::{self, Cmd};
use sanityd::config::{self, SupervisorConfig};
use sanityd::frontend::TerminalFrontend;
use sanityd::install::InstallOutcome;
use sanityd::install::paths;
use sanityd::install::platform::Platform;
use sanityd::lifecycle::{ControllerOptions, LifecycleController, LifecycleState};

fn main() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    match args.sub {
        None => handle_auto().await,
        Some(Cmd::Run {
            port,
            workspace,
            config,
            yes,
        }) => handle_run(port, workspace, config, yes).await,
        Some(Cmd::Install { config }) => handle_install(config).await,
        Some(Cmd::Status { config }) => handle_status(config),
    }
}

fn build_controller(
    config_path: PathBuf,
    workspace_root: Option<PathBuf>,
    port_override: Option<u16>,
    assume_yes: bool,
) -> LifecycleController {
    let frontend = Arc::new(TerminalFrontend::new(assume_yes));
    LifecycleController::new(
        ControllerOptions {
            config_path,
            workspace_root,
            port_override,
            release_base: None,
        },
        frontend,
    )
}

/// Explicit run intent: launch (installing on demand), then supervise until
/// the server exits or the user interrupts.
async fn handle_run(
    port: Option<u16>,
    workspace: Option<PathBuf>,
    config: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    let config_path = config::config_path(config.as_deref())?;
    config::ensure_config_file(&config_path)?;

    let workspace_root = workspace.or_else(|| std::env::current_dir().ok());
    let controller = build_controller(config_path, workspace_root, port, yes);

    controller.run().await;
    if controller.state() != LifecycleState::Running {
        // The cause was already reported through the frontend.
        std::process::exit(1);
    }
    supervise_until_exit(&controller).await
}

/// Default invocation: the automatic trigger. Looks for sanity content in
/// the current workspace and issues the run intent on a match.
async fn handle_auto() -> Result<()> {
    let config_path = config::config_path(None)?;
    config::ensure_config_file(&config_path)?;

    let cfg = SupervisorConfig::load(&config_path)?;
    if !cfg.auto_enable {
        info!("automatic launch disabled (auto_enable = false)");
        return Ok(());
    }

    let workspace_root = std::env::current_dir().ok();
    let controller = build_controller(config_path, workspace_root, None, false);

    controller.workspace_changed().await;
    if controller.state() == LifecycleState::Running {
        supervise_until_exit(&controller).await?;
    }
    Ok(())
}

/// Explicit install intent.
async fn handle_install(config: Option<PathBuf>) -> Result<()> {
    let config_path = config::config_path(config.as_deref())?;
    config::ensure_config_file(&config_path)?;

    let controller = build_controller(config_path, None, None, true);
    match controller.install().await {
        InstallOutcome::Installed => {
            show_install_summary(&controller);
            Ok(())
        }
        InstallOutcome::AlreadyInstalling => Ok(()),
        InstallOutcome::Failed(_) => {
            // Already surfaced through the frontend.
            std::process::exit(1);
        }
    }
}

/// Task registration query: report the launchable unit when installed.
fn handle_status(config: Option<PathBuf>) -> Result<()> {
    let config_path = config::config_path(config.as_deref())?;
    let cfg = SupervisorConfig::load(&config_path)?;

    let controller = build_controller(config_path, None, None, true);
    match controller.provide_run_task() {
        Some(task) => {
            println!("sanity is installed at {}", task.program.display());
            println!(
                "launch: {} {}",
                task.program.display(),
                task.args.join(" ")
            );
            std::process::exit(0);
        }
        None => {
            let expected = paths::resolve_executable(cfg.path.as_deref(), Platform::host())?;
            println!(
                "sanity is not installed (expected at {})",
                expected.display()
            );
            std::process::exit(1);
        }
    }
}

/// Wait for the supervised server to go away: either it exits on its own or
/// Ctrl-C triggers the stop intent. Both paths end with the Idle transition
/// emitted by the exit observer.
async fn supervise_until_exit(controller: &LifecycleController) -> Result<()> {
    let mut states = controller.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping sanity server");
                controller.stop();
            }
            changed = states.changed() => {
                if changed.is_err() || *states.borrow_and_update() == LifecycleState::Idle {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn show_install_summary(controller: &LifecycleController) {
    use std::io::Write;
    use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
    let _ = writeln!(stdout, "\n✓ Sanity installed");
    let _ = stdout.reset();

    if let Some(task) = controller.provide_run_task() {
        let _ = writeln!(stdout, "  executable: {}", task.program.display());
        let _ = writeln!(
            stdout,
            "  launch:     {} {}",
            task.program.display(),
            task.args.join(" ")
        );
    }
    let _ = writeln!(stdout, "\nStart it with `sanityd run`.");
}
