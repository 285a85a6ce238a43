//! Portable n8n launcher CLI.
//!
//! Thin command-line front end over `n8n-portable-core`. Each subcommand
//! maps to one launcher operation; all the actual work lives in the
//! library crate.

use clap::{Parser, Subcommand};
use n8n_portable_core::{Launcher, PathSet};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "n8n-portable")]
#[command(about = "Run a self-contained n8n installation from a single directory")]
#[command(version)]
struct Args {
    /// Installation root (defaults to the directory holding this executable)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the n8n server in the foreground
    Start,
    /// Stop a running n8n server
    Stop,
    /// Install n8n (latest release unless a version is given)
    Install {
        /// Version to install, e.g. 1.64.0
        version: Option<String>,

        /// Reinstall even if the requested version is already present
        #[arg(long)]
        force: bool,
    },
    /// Upgrade n8n to a newer release
    Upgrade {
        /// Target version; defaults to the latest stable GitHub release
        version: Option<String>,
    },
    /// Download and install the bundled Node.js runtime
    Runtime {
        /// Runtime version to install
        #[arg(long)]
        version: Option<String>,
    },
    /// Install community node packages
    Nodes {
        /// npm package names, e.g. n8n-nodes-slack
        #[arg(required = true)]
        packages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let paths = match &args.root {
        Some(root) => PathSet::new(root),
        None => match PathSet::from_current_exe() {
            Ok(paths) => paths,
            Err(e) => {
                error!("Cannot determine installation root: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let launcher = Launcher::new(paths);

    let result = match args.command {
        Command::Start => launcher.start().await.map(|_| ()),
        Command::Stop => launcher.stop().await.map(|_| ()),
        Command::Install { version, force } => launcher.install(version.as_deref(), force).await,
        Command::Upgrade { version } => launcher.upgrade(version.as_deref()).await,
        Command::Runtime { version } => launcher.runtime(version.as_deref()).await,
        Command::Nodes { packages } => match launcher.nodes(&packages).await {
            Ok(summary) if summary.failed() > 0 => {
                error!(
                    "{} of {} package(s) failed to install",
                    summary.failed(),
                    summary.results.len()
                );
                return ExitCode::FAILURE;
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
