//! Server shutdown strategies.
//!
//! Stopping tries several ways of locating the server process, in
//! order: by executable name, by command line pattern, then by the
//! port it listens on. Each located process gets a graceful SIGTERM
//! window before a forced kill. Finding nothing is a clean outcome,
//! not an error; the server may simply not be running.

use crate::config::InstallConfig;
use crate::error::Result;
use crate::platform::process::{
    find_processes_by_cmdline, is_process_alive, port_listeners, terminate_process,
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Result of one stop attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Processes were found and confirmed gone.
    Stopped { count: usize },
    /// Processes were found but at least one survived termination.
    Unconfirmed { remaining: usize },
    /// No matching process existed.
    NothingFound,
}

/// One way of locating and stopping the server.
#[async_trait]
pub trait StopStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Candidate PIDs this strategy can see right now.
    fn locate(&self) -> Vec<u32>;

    async fn stop(&self) -> Result<StopOutcome> {
        let own_pid = std::process::id();
        let pids: Vec<u32> = self
            .locate()
            .into_iter()
            .filter(|pid| *pid != own_pid)
            .collect();

        if pids.is_empty() {
            debug!("Strategy `{}` found no processes", self.name());
            return Ok(StopOutcome::NothingFound);
        }

        info!(
            "Strategy `{}` found {} process(es): {:?}",
            self.name(),
            pids.len(),
            pids
        );

        for pid in &pids {
            match terminate_process(*pid, InstallConfig::GRACEFUL_STOP_TIMEOUT.as_millis() as u64) {
                Ok(true) => debug!("Process {} stopped", pid),
                Ok(false) => warn!("Process {} did not confirm termination", pid),
                Err(e) => warn!("Failed to terminate process {}: {}", pid, e),
            }
        }

        // Short confirmation window before the final check
        tokio::time::sleep(InstallConfig::STOP_CONFIRM_TIMEOUT).await;

        let remaining = pids.iter().filter(|pid| is_process_alive(**pid)).count();
        if remaining == 0 {
            Ok(StopOutcome::Stopped { count: pids.len() })
        } else {
            Ok(StopOutcome::Unconfirmed { remaining })
        }
    }
}

/// Locate by executable name in the process table.
pub struct ByName {
    pub pattern: String,
}

#[async_trait]
impl StopStrategy for ByName {
    fn name(&self) -> &'static str {
        "process-name"
    }

    fn locate(&self) -> Vec<u32> {
        find_processes_by_cmdline(&self.pattern)
            .into_iter()
            .map(|(pid, _)| pid)
            .collect()
    }
}

/// Locate by a distinctive command line fragment, typically the path
/// of the installed package binary.
pub struct ByCmdline {
    pub pattern: String,
}

#[async_trait]
impl StopStrategy for ByCmdline {
    fn name(&self) -> &'static str {
        "command-line"
    }

    fn locate(&self) -> Vec<u32> {
        find_processes_by_cmdline(&self.pattern)
            .into_iter()
            .map(|(pid, _)| pid)
            .collect()
    }
}

/// Locate whatever listens on the configured port.
pub struct ByPort {
    pub port: u16,
}

#[async_trait]
impl StopStrategy for ByPort {
    fn name(&self) -> &'static str {
        "listening-port"
    }

    fn locate(&self) -> Vec<u32> {
        port_listeners(self.port)
    }
}

/// Run strategies in order; the first one that locates a process
/// decides the outcome. All strategies coming up empty reports
/// [`StopOutcome::NothingFound`].
pub async fn run_stop_sequence(strategies: &[Box<dyn StopStrategy>]) -> Result<StopOutcome> {
    for strategy in strategies {
        let outcome = strategy.stop().await?;
        if outcome != StopOutcome::NothingFound {
            return Ok(outcome);
        }
    }
    info!("No running server found by any strategy");
    Ok(StopOutcome::NothingFound)
}
