//! Platform-specific path utilities.
//!
//! This module provides the portable directory layout rooted at the
//! installation directory, plus the per-platform Node.js distribution
//! naming used by runtime acquisition.

use crate::config::{AppConfig, DATA_SUBDIRS, InstallConfig};
use crate::error::{PortableError, Result};
use std::path::{Path, PathBuf};

/// Append `.exe` on Windows, return the name unchanged elsewhere.
pub fn executable_name(base: &str) -> String {
    #[cfg(windows)]
    {
        format!("{base}.exe")
    }
    #[cfg(not(windows))]
    {
        base.to_string()
    }
}

/// Name of the npm launcher shipped with the Node.js distribution.
///
/// # Platform Behavior
/// - **Linux/macOS**: `npm` (shell wrapper)
/// - **Windows**: `npm.cmd`
pub fn npm_executable_name() -> &'static str {
    #[cfg(windows)]
    {
        "npm.cmd"
    }
    #[cfg(not(windows))]
    {
        "npm"
    }
}

/// Every path the launcher touches, derived once from the root.
///
/// Layout:
/// ```text
/// {root}/
///   bin/          bundled Node.js runtime (node, npm, node_modules/npm)
///   lib/          npm prefix holding the n8n package
///   data/         database/, logs/, binary-data/
///   config/.env   user configuration
///   temp/         downloads and extraction scratch
/// ```
#[derive(Debug, Clone)]
pub struct PathSet {
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl PathSet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        PathSet {
            bin_dir: root.join("bin"),
            lib_dir: root.join("lib"),
            data_dir: root.join("data"),
            config_dir: root.join("config"),
            temp_dir: root.join("temp"),
            root,
        }
    }

    /// Root from the running executable's directory.
    ///
    /// The launcher binary lives directly in the portable root, so its
    /// parent directory is the installation root.
    pub fn from_current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let root = exe.parent().ok_or_else(|| PortableError::Config {
            message: "Executable has no parent directory".to_string(),
        })?;
        Ok(Self::new(root))
    }

    /// `{root}/bin/node` or `{root}/bin/node.exe`.
    pub fn node_executable(&self) -> PathBuf {
        self.bin_dir.join(executable_name("node"))
    }

    /// `{root}/bin/npm` or `{root}/bin/npm.cmd`.
    pub fn npm_executable(&self) -> PathBuf {
        self.bin_dir.join(npm_executable_name())
    }

    /// `{root}/config/.env`.
    pub fn env_file(&self) -> PathBuf {
        self.config_dir.join(".env")
    }

    /// `{root}/temp/launcher.lock`.
    pub fn lock_file(&self) -> PathBuf {
        self.temp_dir.join(InstallConfig::LOCK_FILE_NAME)
    }

    /// `{root}/temp/npm-cache`.
    pub fn npm_cache_dir(&self) -> PathBuf {
        self.temp_dir.join(InstallConfig::NPM_CACHE_DIR_NAME)
    }

    /// `{lib}/node_modules/n8n` where npm places the package.
    pub fn package_dir(&self) -> PathBuf {
        self.lib_dir.join("node_modules").join(AppConfig::PACKAGE_NAME)
    }

    /// The n8n CLI entry point inside the installed package.
    pub fn package_binary(&self) -> PathBuf {
        self.package_dir().join("bin").join("n8n")
    }

    /// Create the working directories, including the data subtree.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.bin_dir,
            &self.lib_dir,
            &self.data_dir,
            &self.config_dir,
            &self.temp_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| PortableError::io_with_path(e, dir))?;
        }
        for sub in DATA_SUBDIRS {
            let dir = self.data_dir.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| PortableError::io_with_path(e, &dir))?;
        }
        Ok(())
    }
}

/// Naming and location of an official Node.js distribution archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDist {
    pub url: String,
    pub filename: String,
    pub extension: &'static str,
    /// Top-level directory inside the archive.
    pub extracted_dir_name: String,
    /// Executable path relative to the extracted directory.
    pub executable_rel: PathBuf,
    pub platform_name: &'static str,
    pub arch_name: &'static str,
}

impl RuntimeDist {
    /// Distribution details for the platform this binary runs on.
    pub fn for_current(version: &str) -> Result<Self> {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH, version)
    }

    /// Distribution details for an explicit OS/arch pair.
    ///
    /// `os` and `arch` use the `std::env::consts` vocabulary. Windows
    /// ships zip, Linux xz tarballs and macOS gzip tarballs, matching
    /// what `nodejs.org/dist` actually publishes.
    pub fn for_target(os: &str, arch: &str, version: &str) -> Result<Self> {
        let (platform_name, extension, exe) = match os {
            "windows" => ("win", "zip", "node.exe"),
            "linux" => ("linux", "tar.xz", "node"),
            "macos" => ("darwin", "tar.gz", "node"),
            _ => {
                return Err(PortableError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };

        let arch_name = match arch {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            "x86" => "x86",
            _ => {
                return Err(PortableError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };

        let extracted_dir_name = format!("node-v{version}-{platform_name}-{arch_name}");
        let filename = format!("{extracted_dir_name}.{extension}");
        let url = format!("https://nodejs.org/dist/v{version}/{filename}");

        Ok(RuntimeDist {
            url,
            filename,
            extension,
            extracted_dir_name,
            executable_rel: Path::new("bin").join(exe),
            platform_name,
            arch_name,
        })
    }
}
