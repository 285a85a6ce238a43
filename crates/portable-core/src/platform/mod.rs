//! Platform abstractions: paths, distribution naming, process control.

pub mod paths;
pub mod process;
