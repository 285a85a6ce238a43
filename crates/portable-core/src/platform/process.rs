//! Platform-specific process management.
//!
//! Cross-platform primitives for checking process liveness, terminating
//! processes and scanning the process table. The stop strategies in
//! [`crate::process::stop`] are built on top of these.

#![allow(unsafe_code)]

use crate::error::{PortableError, Result};
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `kill(pid, 0)` signal check
/// - **Windows**: Uses `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
///
/// Never fails; unknown states report as not alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs an existence check without delivering
        // anything; kill is safe to call with any pid value.
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        // SAFETY: OpenProcess returns null on failure; the handle is
        // closed immediately after the check.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if !handle.is_null() {
                CloseHandle(handle);
                true
            } else {
                false
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        false
    }
}

/// Terminate a process gracefully, then forcefully if needed.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM, waits up to `timeout_ms`, then SIGKILL
/// - **Windows**: Uses `taskkill /PID {pid} /F /T` to kill the process tree
///
/// Returns `true` if the process ended (or was already gone).
pub fn terminate_process(pid: u32, timeout_ms: u64) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_process_unix(pid, timeout_ms)
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        terminate_process_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(PortableError::Config {
            message: "Process termination not implemented for this platform".into(),
        })
    }
}

#[cfg(unix)]
fn terminate_process_unix(pid: u32, timeout_ms: u64) -> Result<bool> {
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let nix_pid = Pid::from_raw(pid as i32);

    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    let wait_interval = Duration::from_millis(100);
    let iterations = (timeout_ms / 100).max(1);

    for _ in 0..iterations {
        sleep(wait_interval);
        // Reap if the process was our child, so the liveness check below
        // does not see a lingering zombie.
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        return Err(PortableError::Io {
            message: format!("Failed to kill process {pid}: {e}"),
            path: None,
            source: None,
        });
    }

    sleep(Duration::from_millis(100));
    let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));

    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_process_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);

    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| PortableError::Io {
            message: format!("Failed to run taskkill: {e}"),
            path: None,
            source: Some(e),
        })?;

    if output.status.success() {
        debug!("Process {} terminated", pid);
        Ok(true)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Already-gone processes report as "not found"
        if stderr.contains("not found") || stderr.contains("not running") {
            Ok(true)
        } else {
            warn!("taskkill failed for {}: {}", pid, stderr);
            Ok(false)
        }
    }
}

/// Scan for processes matching a pattern in their command line.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `ps -eo pid=,args=`
/// - **Windows**: Uses `wmic process get processid,commandline`
///
/// Returns a list of (pid, cmdline) tuples. Failures to run the system
/// tool report as an empty list.
pub fn find_processes_by_cmdline(pattern: &str) -> Vec<(u32, String)> {
    #[cfg(unix)]
    {
        find_processes_unix(pattern)
    }

    #[cfg(windows)]
    {
        find_processes_windows(pattern)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pattern;
        vec![]
    }
}

#[cfg(unix)]
fn find_processes_unix(pattern: &str) -> Vec<(u32, String)> {
    use std::process::Command;

    let output = match Command::new("ps").args(["-eo", "pid=,args="]).output() {
        Ok(o) => o,
        Err(e) => {
            debug!("Failed to run ps: {}", e);
            return vec![];
        }
    };

    if !output.status.success() {
        return vec![];
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pattern_lower = pattern.to_lowercase();

    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let parts: Vec<&str> = line.splitn(2, char::is_whitespace).collect();
            if parts.len() != 2 {
                return None;
            }

            let pid: u32 = parts[0].trim().parse().ok()?;
            let cmdline = parts[1].trim();

            if cmdline.to_lowercase().contains(&pattern_lower) {
                Some((pid, cmdline.to_string()))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(windows)]
fn find_processes_windows(pattern: &str) -> Vec<(u32, String)> {
    use std::process::Command;

    let output = match Command::new("wmic")
        .args(["process", "get", "processid,commandline", "/format:csv"])
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            debug!("Failed to run wmic: {}", e);
            return vec![];
        }
    };

    if !output.status.success() {
        return vec![];
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pattern_lower = pattern.to_lowercase();

    stdout
        .lines()
        .skip(1) // header
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }

            // CSV format: Node,CommandLine,ProcessId
            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() < 3 {
                return None;
            }

            let cmdline = parts[1];
            let pid: u32 = parts[2].trim().parse().ok()?;

            if cmdline.to_lowercase().contains(&pattern_lower) {
                Some((pid, cmdline.to_string()))
            } else {
                None
            }
        })
        .collect()
}

/// Whether any process (other than this one) matches the pattern.
///
/// Never fails; enumeration problems report as not running.
pub fn is_process_running(pattern: &str) -> bool {
    let own_pid = std::process::id();
    find_processes_by_cmdline(pattern)
        .iter()
        .any(|(pid, _)| *pid != own_pid)
}

/// Find PIDs listening on a TCP port.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `lsof -ti :{port}`
/// - **Windows**: Parses `netstat -ano` for LISTENING rows on the port
///
/// Failures to run the system tool report as an empty list.
pub fn port_listeners(port: u16) -> Vec<u32> {
    #[cfg(unix)]
    {
        use std::process::Command;

        let output = match Command::new("lsof").args(["-ti", &format!(":{port}")]).output() {
            Ok(o) => o,
            Err(e) => {
                debug!("Failed to run lsof: {}", e);
                return vec![];
            }
        };

        // lsof exits non-zero when nothing matches
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect()
    }

    #[cfg(windows)]
    {
        use std::process::Command;

        let output = match Command::new("netstat").args(["-ano"]).output() {
            Ok(o) => o,
            Err(e) => {
                debug!("Failed to run netstat: {}", e);
                return vec![];
            }
        };

        let needle = format!(":{port}");
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| line.contains("LISTENING"))
            .filter_map(|line| {
                let cols: Vec<&str> = line.split_whitespace().collect();
                // Proto Local-Address Foreign-Address State PID
                if cols.len() < 5 || !cols[1].ends_with(&needle) {
                    return None;
                }
                cols[4].parse().ok()
            })
            .collect()
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = port;
        vec![]
    }
}
