//! Community node installation.
//!
//! Nodes install into `{root}/data/.n8n/nodes`, the directory n8n
//! scans at startup. Packages install sequentially; one failure does
//! not abort the rest, and the summary reports both sides.

use crate::config::{AppConfig, InstallConfig};
use crate::error::{PortableError, Result};
use crate::install::manifest;
use crate::platform::paths::PathSet;
use crate::process::runner::{self, CommandSpec};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info};

/// Per-package result in a nodes install run.
#[derive(Debug, Clone)]
pub struct NodeInstallResult {
    pub package: String,
    pub error: Option<String>,
}

impl NodeInstallResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a nodes install run.
#[derive(Debug, Default)]
pub struct NodesSummary {
    pub results: Vec<NodeInstallResult>,
}

impl NodesSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Installs community node packages for the n8n instance.
pub struct NodesInstaller {
    paths: PathSet,
}

impl NodesInstaller {
    pub fn new(paths: PathSet) -> Self {
        Self { paths }
    }

    /// `{root}/data/.n8n/nodes`.
    pub fn nodes_dir(&self) -> PathBuf {
        self.paths.data_dir.join(".n8n").join("nodes")
    }

    /// Install each package in turn, collecting per-package outcomes.
    ///
    /// Requires the runtime and the n8n package to already be in
    /// place; community nodes are useless without a host to load them.
    pub async fn install_all(&self, packages: &[String]) -> Result<NodesSummary> {
        if packages.is_empty() {
            return Err(PortableError::Config {
                message: "no node packages given".to_string(),
            });
        }

        let node = self.paths.node_executable();
        if !node.exists() {
            return Err(PortableError::MissingRuntime(node));
        }
        if manifest::installed_version(&self.paths).is_none() {
            return Err(PortableError::InstallationFailed {
                message: format!(
                    "{} is not installed; run `install` first",
                    AppConfig::PACKAGE_NAME
                ),
            });
        }

        self.prepare_environment()?;

        let mut summary = NodesSummary::default();
        for (index, package) in packages.iter().enumerate() {
            info!("[{}/{}] Installing {}", index + 1, packages.len(), package);

            match self.install_one(package).await {
                Ok(()) => {
                    info!("Installed {}", package);
                    summary.results.push(NodeInstallResult {
                        package: package.clone(),
                        error: None,
                    });
                }
                Err(e) => {
                    error!("Failed to install {}: {}", package, e);
                    summary.results.push(NodeInstallResult {
                        package: package.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            "Nodes install finished: {} succeeded, {} failed",
            summary.succeeded(),
            summary.failed()
        );
        Ok(summary)
    }

    /// List installed node package names, including scoped ones.
    pub fn installed_nodes(&self) -> Vec<String> {
        let node_modules = self.nodes_dir().join("node_modules");
        let Ok(entries) = std::fs::read_dir(&node_modules) else {
            return vec![];
        };

        let mut names = vec![];
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !path.is_dir() {
                continue;
            }
            if name.starts_with('@') {
                if let Ok(scoped) = std::fs::read_dir(&path) {
                    for inner in scoped.flatten() {
                        if inner.path().join("package.json").exists() {
                            names.push(format!(
                                "{}/{}",
                                name,
                                inner.file_name().to_string_lossy()
                            ));
                        }
                    }
                }
            } else if path.join("package.json").exists() {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    async fn install_one(&self, package: &str) -> Result<()> {
        let mut command = CommandSpec::new(self.paths.npm_executable())
            .with_args([
                "install",
                package,
                "--save",
                "--no-audit",
                "--no-fund",
                "--progress=false",
            ])
            .with_current_dir(self.nodes_dir());
        for (key, value) in self.npm_environment() {
            command = command.with_env(key, value);
        }

        let mut child = runner::spawn(&command)?;
        let status =
            runner::wait_bounded(&mut child, &command, InstallConfig::NPM_INSTALL_TIMEOUT).await?;

        if !status.success() {
            return Err(PortableError::InstallationFailed {
                message: format!(
                    "npm install {} exited with code {}",
                    package,
                    status.code().unwrap_or(-1)
                ),
            });
        }
        Ok(())
    }

    fn npm_environment(&self) -> HashMap<String, String> {
        let separator = if cfg!(windows) { ';' } else { ':' };
        let path = match std::env::var("PATH") {
            Ok(existing) => format!("{}{}{}", self.paths.bin_dir.display(), separator, existing),
            Err(_) => self.paths.bin_dir.display().to_string(),
        };

        HashMap::from([
            (
                "NPM_CONFIG_PREFIX".to_string(),
                self.nodes_dir().display().to_string(),
            ),
            (
                "NPM_CONFIG_CACHE".to_string(),
                self.paths.npm_cache_dir().display().to_string(),
            ),
            ("PATH".to_string(), path),
        ])
    }

    fn prepare_environment(&self) -> Result<()> {
        let nodes_dir = self.nodes_dir();
        let node_modules = nodes_dir.join("node_modules");
        std::fs::create_dir_all(&node_modules)
            .map_err(|e| PortableError::io_with_path(e, &node_modules))?;
        std::fs::create_dir_all(self.paths.npm_cache_dir())
            .map_err(|e| PortableError::io_with_path(e, self.paths.npm_cache_dir()))?;

        let manifest_path = nodes_dir.join("package.json");
        if !manifest_path.exists() {
            let contents = serde_json::json!({
                "name": "installed-nodes",
                "private": true,
                "dependencies": {}
            });
            std::fs::write(&manifest_path, serde_json::to_string_pretty(&contents)?)
                .map_err(|e| PortableError::io_with_path(e, &manifest_path))?;
        }
        Ok(())
    }
}
