//! npm package installation into the portable prefix.
//!
//! The bundled npm installs n8n under `{root}/lib` with its cache in
//! `{root}/temp/npm-cache`. The npm configuration travels on the
//! spawned child's environment; the launcher's own environment is
//! never modified.

use crate::config::{AppConfig, InstallConfig};
use crate::error::{PortableError, Result};
use crate::install::manifest;
use crate::platform::paths::PathSet;
use crate::process::runner::{self, CommandSpec};
use std::collections::HashMap;
use tracing::{info, warn};

/// Installs and verifies the n8n package.
pub struct PackageInstaller {
    paths: PathSet,
}

impl PackageInstaller {
    pub fn new(paths: PathSet) -> Self {
        Self { paths }
    }

    /// npm package spec: `n8n@{version}`, or bare `n8n` for latest.
    pub fn package_spec(version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{}@{}", AppConfig::PACKAGE_NAME, version),
            None => AppConfig::PACKAGE_NAME.to_string(),
        }
    }

    /// Environment the npm child runs with.
    ///
    /// Prefix and cache point into the portable tree, and the bundled
    /// runtime's bin directory is prepended to PATH so npm resolves the
    /// portable node, not a system one.
    pub fn npm_environment(&self) -> HashMap<String, String> {
        let separator = if cfg!(windows) { ';' } else { ':' };
        let path = match std::env::var("PATH") {
            Ok(existing) => format!("{}{}{}", self.paths.bin_dir.display(), separator, existing),
            Err(_) => self.paths.bin_dir.display().to_string(),
        };

        HashMap::from([
            (
                "NPM_CONFIG_PREFIX".to_string(),
                self.paths.lib_dir.display().to_string(),
            ),
            (
                "NPM_CONFIG_CACHE".to_string(),
                self.paths.npm_cache_dir().display().to_string(),
            ),
            ("PATH".to_string(), path),
        ])
    }

    /// Install the package, streaming npm's output to the terminal.
    ///
    /// An npm run that outlives the install timeout is killed before
    /// the timeout error returns.
    pub async fn install(&self, version: Option<&str>) -> Result<()> {
        let node = self.paths.node_executable();
        if !node.exists() {
            return Err(PortableError::MissingRuntime(node));
        }

        std::fs::create_dir_all(&self.paths.lib_dir)
            .map_err(|e| PortableError::io_with_path(e, &self.paths.lib_dir))?;
        std::fs::create_dir_all(self.paths.npm_cache_dir())
            .map_err(|e| PortableError::io_with_path(e, self.paths.npm_cache_dir()))?;
        self.ensure_prefix_manifest()?;

        let spec = Self::package_spec(version);
        info!("Installing {}", spec);

        let mut command = CommandSpec::new(self.paths.npm_executable())
            .with_args(["install", &spec, "--save", "--no-audit", "--no-fund"])
            .with_current_dir(&self.paths.lib_dir);
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
                    spec,
                    status.code().unwrap_or(-1)
                ),
            });
        }

        Ok(())
    }

    /// Check the installation and return the installed version.
    ///
    /// A missing package manifest fails; a missing CLI entry point only
    /// warns, since some package layouts relocate it.
    pub fn verify(&self) -> Result<String> {
        let version = manifest::installed_version(&self.paths).ok_or_else(|| {
            PortableError::VerificationFailed {
                message: format!(
                    "package manifest not found under {}",
                    self.paths.package_dir().display()
                ),
            }
        })?;

        if manifest::binary_present(&self.paths) {
            info!("Installed version {}", version);
        } else {
            warn!(
                "Package binary not found at {}",
                self.paths.package_binary().display()
            );
        }

        Ok(version)
    }

    /// The npm prefix carries a private package.json so `--save` has a
    /// manifest to record the dependency in.
    fn ensure_prefix_manifest(&self) -> Result<()> {
        let manifest_path = self.paths.lib_dir.join("package.json");
        if manifest_path.exists() {
            return Ok(());
        }

        let contents = serde_json::json!({
            "name": "n8n-portable",
            "private": true,
            "dependencies": {}
        });
        std::fs::write(&manifest_path, serde_json::to_string_pretty(&contents)?)
            .map_err(|e| PortableError::io_with_path(e, &manifest_path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_spec() {
        assert_eq!(PackageInstaller::package_spec(None), "n8n");
        assert_eq!(
            PackageInstaller::package_spec(Some("1.64.0")),
            "n8n@1.64.0"
        );
    }

    #[test]
    fn test_npm_environment_points_into_portable_tree() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        let installer = PackageInstaller::new(paths.clone());

        let env = installer.npm_environment();
        assert_eq!(
            env.get("NPM_CONFIG_PREFIX"),
            Some(&paths.lib_dir.display().to_string())
        );
        assert_eq!(
            env.get("NPM_CONFIG_CACHE"),
            Some(&paths.npm_cache_dir().display().to_string())
        );
        assert!(env
            .get("PATH")
            .unwrap()
            .starts_with(&paths.bin_dir.display().to_string()));
    }

    #[tokio::test]
    async fn test_install_requires_runtime() {
        let tmp = tempfile::TempDir::new().unwrap();
        let installer = PackageInstaller::new(PathSet::new(tmp.path()));

        let err = installer.install(None).await.unwrap_err();
        assert!(matches!(err, PortableError::MissingRuntime(_)));
    }

    #[test]
    fn test_verify_without_manifest_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let installer = PackageInstaller::new(PathSet::new(tmp.path()));

        let err = installer.verify().unwrap_err();
        assert!(matches!(err, PortableError::VerificationFailed { .. }));
    }

    #[test]
    fn test_verify_with_manifest_but_no_binary_warns_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        let pkg_dir = paths.package_dir();
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("package.json"),
            r#"{"name": "n8n", "version": "1.64.0"}"#,
        )
        .unwrap();

        let installer = PackageInstaller::new(paths);
        assert_eq!(installer.verify().unwrap(), "1.64.0");
    }
}
