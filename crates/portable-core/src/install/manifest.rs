//! Installed package inspection.
//!
//! The source of truth for what is installed is the package's own
//! `package.json` inside the npm prefix. Reads never fail: a missing
//! or unreadable manifest just means nothing usable is installed.

use crate::platform::paths::PathSet;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PackageManifest {
    version: String,
}

/// Version of the installed package, if any.
///
/// Returns `None` when the package is absent or its manifest cannot
/// be parsed; callers treat both the same way.
pub fn installed_version(paths: &PathSet) -> Option<String> {
    let manifest_path = paths.package_dir().join("package.json");

    let contents = match std::fs::read_to_string(&manifest_path) {
        Ok(contents) => contents,
        Err(_) => return None,
    };

    match serde_json::from_str::<PackageManifest>(&contents) {
        Ok(manifest) => Some(manifest.version),
        Err(e) => {
            debug!(
                "Unreadable package manifest {}: {}",
                manifest_path.display(),
                e
            );
            None
        }
    }
}

/// Whether the package's CLI entry point exists.
pub fn binary_present(paths: &PathSet) -> bool {
    paths.package_binary().exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_install(version: &str) -> (PathSet, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        let pkg_dir = paths.package_dir();
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("package.json"),
            format!(r#"{{"name": "n8n", "version": "{version}"}}"#),
        )
        .unwrap();
        (paths, tmp)
    }

    #[test]
    fn test_installed_version_reads_manifest() {
        let (paths, _tmp) = fake_install("1.64.0");
        assert_eq!(installed_version(&paths), Some("1.64.0".to_string()));
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        assert_eq!(installed_version(&paths), None);
    }

    #[test]
    fn test_corrupt_manifest_is_none() {
        let (paths, _tmp) = fake_install("1.64.0");
        std::fs::write(paths.package_dir().join("package.json"), "{oops").unwrap();
        assert_eq!(installed_version(&paths), None);
    }

    #[test]
    fn test_binary_present() {
        let (paths, _tmp) = fake_install("1.64.0");
        assert!(!binary_present(&paths));

        let bin_dir = paths.package_dir().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::fs::write(bin_dir.join("n8n"), "#!/usr/bin/env node\n").unwrap();
        assert!(binary_present(&paths));
    }
}
