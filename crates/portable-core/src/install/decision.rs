//! Install/upgrade decision logic.
//!
//! A pure function from (requested version, installed version) to the
//! action to take, so the policy is testable without touching npm or
//! the filesystem.

use tracing::info;

/// What an install or upgrade request should actually do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallDecision {
    /// Nothing usable is installed; install the requested version.
    FreshInstall,
    /// The installed version already satisfies the request.
    Skip,
    /// Replace the installed version with itself. Only produced by an
    /// explicit force request, never by [`decide`].
    Reinstall,
    /// A different version is installed; replace it with this one.
    UpgradeTo(String),
}

/// Decide what to do given the requested and installed versions.
///
/// Rules:
/// - nothing installed: fresh install, whatever was requested
/// - no explicit version requested over an existing install: keep it
///   (re-running with a version, or `upgrade`, replaces it)
/// - same version requested: keep it
/// - different version requested: upgrade to it
pub fn decide(requested: Option<&str>, installed: Option<&str>) -> InstallDecision {
    let Some(installed) = installed else {
        return InstallDecision::FreshInstall;
    };

    match requested {
        None => {
            info!(
                "Version {} already installed; pass a version or run `upgrade` to replace it",
                installed
            );
            InstallDecision::Skip
        }
        Some(requested) if requested == installed => InstallDecision::Skip,
        Some(requested) => InstallDecision::UpgradeTo(requested.to_string()),
    }
}
