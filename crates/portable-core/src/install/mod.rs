//! Installation: runtime acquisition, package install, community nodes.

pub mod decision;
pub mod manifest;
pub mod nodes;
pub mod package;
pub mod runtime;

pub use decision::{decide, InstallDecision};
pub use nodes::{NodesInstaller, NodesSummary};
pub use package::PackageInstaller;
pub use runtime::RuntimeInstaller;
