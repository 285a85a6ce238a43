//! Portable Core - Headless library for running a portable n8n installation.
//!
//! This crate provides the full lifecycle for a self-contained n8n directory:
//! acquiring a Node.js runtime, installing and upgrading the n8n package via
//! npm, installing community nodes, and starting/stopping the server. It can
//! be used programmatically without the CLI layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use n8n_portable_core::{Launcher, PathSet};
//!
//! #[tokio::main]
//! async fn main() -> n8n_portable_core::Result<()> {
//!     let launcher = Launcher::new(PathSet::new("/path/to/n8n-portable"));
//!
//!     // Fetch the bundled Node.js runtime, then the latest n8n release
//!     launcher.runtime(None).await?;
//!     launcher.install(None, false).await?;
//!
//!     // Run the server in the foreground until Ctrl+C
//!     launcher.start().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod env;
pub mod error;
pub mod install;
pub mod lifecycle;
pub mod network;
pub mod platform;
pub mod process;

// Re-export commonly used types
pub use env::Environment;
pub use error::{PortableError, Result};
pub use install::{decide, InstallDecision, NodesInstaller, NodesSummary, PackageInstaller, RuntimeInstaller};
pub use lifecycle::{Launcher, StartOutcome};
pub use network::{Downloader, DownloadProgress, GitHubRelease, HttpClient, ReleasesClient};
pub use platform::paths::PathSet;
pub use process::stop::StopOutcome;
