//! High-level operations: start, stop, install, upgrade, nodes.
//!
//! Each operation composes the lower layers and owns the advisory
//! lock for its duration. The lock releases on every exit path,
//! including errors, via a drop guard.
//!
//! The runtime is never downloaded implicitly. Operations that need
//! it fail with [`PortableError::MissingRuntime`], which points the
//! user at the explicit `runtime` acquisition flow.

use crate::config::{AppConfig, InstallConfig};
use crate::env::{self, Environment};
use crate::error::{PortableError, Result};
use crate::install::{decide, InstallDecision, NodesInstaller, NodesSummary, PackageInstaller, RuntimeInstaller};
use crate::network::ReleasesClient;
use crate::platform::paths::{executable_name, PathSet};
use crate::platform::process::{is_process_running, terminate_process};
use crate::process::lock::LockFile;
use crate::process::runner::{self, CommandSpec};
use crate::process::stop::{run_stop_sequence, ByCmdline, ByName, ByPort, StopOutcome, StopStrategy};
use tracing::{info, warn};

/// Releases the lock when the operation ends, however it ends.
struct LockGuard<'a>(&'a LockFile);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// How a `start` run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// The server exited on its own with a zero status.
    ServerExited,
    /// Ctrl-C arrived and the server was shut down.
    Interrupted,
}

/// Entry point for every launcher operation.
pub struct Launcher {
    paths: PathSet,
    lock: LockFile,
}

impl Launcher {
    pub fn new(paths: PathSet) -> Self {
        let lock = LockFile::new(paths.lock_file());
        Self { paths, lock }
    }

    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    /// Start the server in the foreground.
    ///
    /// The runtime must already be installed; the package is installed
    /// on first start, and a default configuration file is written on
    /// first run.
    pub async fn start(&self) -> Result<StartOutcome> {
        // Checked before anything touches the filesystem
        let node = self.paths.node_executable();
        if !node.exists() {
            return Err(PortableError::MissingRuntime(node));
        }

        self.lock.acquire("start")?;
        let _guard = LockGuard(&self.lock);

        let installer = PackageInstaller::new(self.paths.clone());
        if !crate::install::manifest::binary_present(&self.paths) {
            info!("{} is not installed, installing", AppConfig::PACKAGE_NAME);
            installer.install(None).await?;
            installer.verify()?;
        }

        env::ensure_default_file(&self.paths)?;
        let environment = Environment::load(&self.paths)?;
        self.paths.ensure_directories()?;

        let host = environment.get("N8N_HOST").unwrap_or("localhost");
        let port = environment.port();
        info!("Server will be reachable at http://{}:{}", host, port);
        environment.log_summary();

        let mut command = CommandSpec::new(self.paths.node_executable())
            .with_arg(self.paths.package_binary().display().to_string())
            .with_arg("start")
            .with_current_dir(&self.paths.root)
            .with_env(
                "NODE_PATH",
                self.paths.lib_dir.join("node_modules").display().to_string(),
            );
        for (key, value) in environment.vars() {
            command = command.with_env(key, value);
        }

        let mut child = runner::spawn(&command)?;
        info!("Server started, press Ctrl+C to stop");

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| PortableError::Io {
                    message: format!("Failed waiting for server: {e}"),
                    path: None,
                    source: Some(e),
                })?;
                if status.success() {
                    info!("Server exited");
                    Ok(StartOutcome::ServerExited)
                } else {
                    Err(PortableError::NonZeroExit {
                        command: command.display(),
                        code: status.code().unwrap_or(-1),
                        stderr_tail: String::new(),
                    })
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping server");
                if let Some(pid) = child.id() {
                    let _ = terminate_process(
                        pid,
                        InstallConfig::GRACEFUL_STOP_TIMEOUT.as_millis() as u64,
                    );
                }
                let _ = child.wait().await;
                Ok(StartOutcome::Interrupted)
            }
        }
    }

    /// Stop a running server, wherever it came from.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let environment = Environment::load(&self.paths)?;
        let cmdline_pattern = self.paths.package_binary().display().to_string();

        let strategies: Vec<Box<dyn StopStrategy>> = vec![
            Box::new(ByName {
                pattern: executable_name(AppConfig::PACKAGE_NAME),
            }),
            Box::new(ByCmdline {
                pattern: cmdline_pattern.clone(),
            }),
            Box::new(ByPort {
                port: environment.port(),
            }),
        ];

        let outcome = run_stop_sequence(&strategies).await?;
        match &outcome {
            StopOutcome::Stopped { count } => info!("Stopped {} process(es)", count),
            StopOutcome::Unconfirmed { remaining } => {
                warn!("{} process(es) did not confirm termination", remaining)
            }
            StopOutcome::NothingFound => info!("Server was not running"),
        }

        // Final confirmation sweep; still detected is a warning, not an error
        if outcome != StopOutcome::NothingFound {
            let confirmed = runner::wait_for(
                "server shutdown",
                InstallConfig::STOP_CONFIRM_TIMEOUT,
                || !is_process_running(&cmdline_pattern),
            )
            .await;
            if confirmed.is_err() {
                warn!("Server process still detected after stop");
            }
        }
        Ok(outcome)
    }

    /// Install the package at `version`, or latest when `None`.
    ///
    /// `force` reinstalls even when the installed version already
    /// satisfies the request.
    pub async fn install(&self, version: Option<&str>, force: bool) -> Result<()> {
        self.lock.acquire("install")?;
        let _guard = LockGuard(&self.lock);

        let installed = crate::install::manifest::installed_version(&self.paths);
        let decision = if force && installed.is_some() {
            InstallDecision::Reinstall
        } else {
            decide(version, installed.as_deref())
        };

        match decision {
            InstallDecision::Skip => {
                info!("Nothing to do");
                return Ok(());
            }
            InstallDecision::FreshInstall => {
                info!("Performing fresh install");
            }
            InstallDecision::Reinstall => {
                info!(
                    "Reinstalling over {}",
                    installed.as_deref().unwrap_or("unknown")
                );
            }
            InstallDecision::UpgradeTo(target) => {
                info!(
                    "Replacing {} with {}",
                    installed.as_deref().unwrap_or("unknown"),
                    target
                );
            }
        }

        let installer = PackageInstaller::new(self.paths.clone());
        installer.install(version).await?;
        let version = installer.verify()?;
        info!("Installed {} {}", AppConfig::PACKAGE_NAME, version);
        Ok(())
    }

    /// Upgrade to `version`, or to the latest stable GitHub release.
    pub async fn upgrade(&self, version: Option<&str>) -> Result<()> {
        let target = match version {
            Some(version) => {
                crate::network::releases::normalize_tag(version).to_string()
            }
            None => {
                let client = ReleasesClient::new(AppConfig::GITHUB_REPO)?;
                let latest = client.latest_stable().await?;
                info!("Latest stable release: {}", latest.version());
                latest.version().to_string()
            }
        };

        self.install(Some(&target), false).await
    }

    /// Download and install the bundled runtime.
    ///
    /// Always reinstalls, so a damaged runtime can be repaired in
    /// place.
    pub async fn runtime(&self, version: Option<&str>) -> Result<()> {
        self.lock.acquire("runtime")?;
        let _guard = LockGuard(&self.lock);

        let installer = RuntimeInstaller::new(self.paths.clone());
        if installer.is_installed() {
            info!("Replacing existing runtime");
        }

        let version = version.unwrap_or(AppConfig::RUNTIME_VERSION);
        installer.install(version).await
    }

    /// Install community node packages.
    pub async fn nodes(&self, packages: &[String]) -> Result<NodesSummary> {
        self.lock.acquire("nodes")?;
        let _guard = LockGuard(&self.lock);

        NodesInstaller::new(self.paths.clone())
            .install_all(packages)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_released_after_failed_operation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());

        let launcher = Launcher::new(paths);
        // The empty package list is rejected by the nodes installer
        let result = launcher.nodes(&[]).await;
        assert!(result.is_err());

        // The lock must not survive the failure
        assert!(!launcher.paths().lock_file().exists());
    }

    #[tokio::test]
    async fn test_concurrent_operations_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let launcher = Launcher::new(PathSet::new(tmp.path()));

        launcher.lock.acquire("start").unwrap();
        let err = launcher.install(Some("1.64.0"), false).await.unwrap_err();
        assert!(matches!(err, PortableError::AlreadyRunning { .. }));
        launcher.lock.release();
    }

    #[tokio::test]
    async fn test_start_without_runtime_mutates_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let launcher = Launcher::new(PathSet::new(tmp.path()));

        let err = launcher.start().await.unwrap_err();
        assert!(matches!(err, PortableError::MissingRuntime(_)));

        // Not even the lock file was written
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_install_skip_short_circuits() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        let pkg_dir = paths.package_dir();
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("package.json"),
            r#"{"name": "n8n", "version": "1.64.0"}"#,
        )
        .unwrap();

        let launcher = Launcher::new(paths);
        // Same version requested: no npm invocation, just a skip
        launcher.install(Some("1.64.0"), false).await.unwrap();
    }

    #[tokio::test]
    async fn test_forced_install_does_not_skip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        let pkg_dir = paths.package_dir();
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("package.json"),
            r#"{"name": "n8n", "version": "1.64.0"}"#,
        )
        .unwrap();

        let launcher = Launcher::new(paths);
        // Reinstall proceeds and hits the missing runtime instead
        let err = launcher.install(Some("1.64.0"), true).await.unwrap_err();
        assert!(matches!(err, PortableError::MissingRuntime(_)));
    }
}
