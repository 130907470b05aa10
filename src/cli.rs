use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "sanity server supervisor")]
pub struct Args {
    /// Sub‑commands (run, install, status)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Launch the managed server, installing it first if it is missing
    Run {
        /// Port the server binds to (overrides the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Workspace root used as the server's working directory
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Install without asking for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Download the server release for this platform (Exit 0 = success, 1 = failed)
    Install {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Show the resolved executable and install state (Exit 0 = installed, 1 = not)
    Status {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}
