//! Process lifecycle: running commands, stopping the server, locking.

pub mod lock;
pub mod runner;
pub mod stop;

pub use lock::{LockFile, LockRecord};
pub use runner::{run_capture, spawn, wait_for, CapturedOutput, CommandSpec};
pub use stop::{run_stop_sequence, ByCmdline, ByName, ByPort, StopOutcome, StopStrategy};
