//! Node.js runtime acquisition.
//!
//! Downloads the official distribution for the current platform,
//! extracts it into scratch space and moves it into `{root}/bin`. The
//! move is a rename with a copy fallback for cross-device temp
//! directories.

use crate::config::{InstallConfig, NetworkConfig};
use crate::error::{PortableError, Result};
use crate::network::download::{DownloadProgress, Downloader};
use crate::platform::paths::{PathSet, RuntimeDist};
use crate::process::runner::{self, CommandSpec};
use crate::{archive, config::AppConfig};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Installs and verifies the bundled Node.js runtime.
pub struct RuntimeInstaller {
    paths: PathSet,
}

impl RuntimeInstaller {
    pub fn new(paths: PathSet) -> Self {
        Self { paths }
    }

    /// Whether the runtime executable is already in place.
    pub fn is_installed(&self) -> bool {
        self.paths.node_executable().exists()
    }

    /// Download, extract and move the runtime into place, replacing
    /// whatever is currently in `{root}/bin`.
    pub async fn install(&self, version: &str) -> Result<()> {
        let dist = RuntimeDist::for_current(version)?;
        info!(
            "Installing Node.js {} ({}-{})",
            version, dist.platform_name, dist.arch_name
        );

        std::fs::create_dir_all(&self.paths.temp_dir)
            .map_err(|e| PortableError::io_with_path(e, &self.paths.temp_dir))?;

        let archive_path = self.paths.temp_dir.join(&dist.filename);
        let downloader = Downloader::new()?;
        let (tx, rx) = mpsc::channel(16);
        let reporter = tokio::spawn(report_progress(rx));

        let result = downloader
            .download_with_retry(
                &dist.url,
                &archive_path,
                NetworkConfig::DOWNLOAD_RETRIES,
                Some(tx),
            )
            .await;
        let _ = reporter.await;
        result?;

        let extract_dir = self.paths.temp_dir.join("runtime-extract");
        if extract_dir.exists() {
            std::fs::remove_dir_all(&extract_dir)
                .map_err(|e| PortableError::io_with_path(e, &extract_dir))?;
        }
        archive::extract(&archive_path, &extract_dir, true).await?;

        let source = extract_dir.join(&dist.extracted_dir_name);
        if !source.is_dir() {
            return Err(PortableError::ExtractionFailed {
                message: format!(
                    "archive did not contain expected directory {}",
                    dist.extracted_dir_name
                ),
            });
        }

        move_into_place(&source, &self.paths.bin_dir)?;
        let _ = std::fs::remove_dir_all(&extract_dir);

        self.verify(version).await?;
        info!("Runtime installed to {}", self.paths.bin_dir.display());
        Ok(())
    }

    /// Probe `node --version` and compare against the requested version.
    ///
    /// A version mismatch only warns; a broken or missing executable
    /// fails.
    pub async fn verify(&self, expected: &str) -> Result<()> {
        let node = self.paths.node_executable();
        if !node.exists() {
            return Err(PortableError::MissingRuntime(node));
        }

        let spec = CommandSpec::new(&node).with_arg("--version");
        let output = runner::run_capture(&spec, InstallConfig::VERSION_PROBE_TIMEOUT).await?;
        let reported = output.stdout.trim();

        if reported.trim_start_matches('v') != expected {
            warn!(
                "Runtime reports {} but {} was requested",
                reported, expected
            );
        } else {
            debug!("Runtime verified: {}", reported);
        }
        Ok(())
    }

    /// Default runtime version the launcher bundles.
    pub fn default_version() -> &'static str {
        AppConfig::RUNTIME_VERSION
    }
}

async fn report_progress(mut rx: mpsc::Receiver<DownloadProgress>) {
    while let Some(update) = rx.recv().await {
        match update.percent {
            Some(percent) => info!(
                "Downloading runtime: {:.1}% ({} bytes)",
                percent, update.bytes_downloaded
            ),
            None => info!("Downloading runtime: {} bytes", update.bytes_downloaded),
        }
    }
}

/// Replace `dest` with `source`, renaming when possible and copying
/// recursively when the rename crosses filesystems.
fn move_into_place(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| PortableError::io_with_path(e, dest))?;
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PortableError::io_with_path(e, parent))?;
    }

    match std::fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Rename failed ({}), falling back to copy", e);
            copy_dir_recursive(source, dest)?;
            if let Err(rm_err) = std::fs::remove_dir_all(source) {
                warn!("Failed to remove source after copy: {}", rm_err);
            }
            Ok(())
        }
    }
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| PortableError::io_with_path(e, dest))?;

    let entries = std::fs::read_dir(source).map_err(|e| PortableError::io_with_path(e, source))?;
    for entry in entries {
        let entry = entry.map_err(|e| PortableError::io_with_path(e, source))?;
        let target = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| PortableError::io_with_path(e, entry.path()))?;

        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .map_err(|e| PortableError::io_with_path(e, entry.path()))?;
        }
    }
    Ok(())
}
