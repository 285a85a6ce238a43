//! Child process execution.
//!
//! Wraps `tokio::process` with the launcher's conventions: commands
//! carry an explicit environment map and working directory, captured
//! runs are bounded by a timeout, and non-zero exits surface the tail
//! of stderr in the error.

use crate::config::InstallConfig;
use crate::error::{PortableError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::debug;

/// How many trailing stderr bytes a failure report keeps.
const STDERR_TAIL_LEN: usize = 400;

/// A command to run, with its environment spelled out.
///
/// Environment entries are applied on top of the parent's environment;
/// the launcher never mutates its own process environment to influence
/// a child.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            current_dir: None,
            env: HashMap::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// One-line rendering for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Output of a captured command run.
#[derive(Debug)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run a command to completion, capturing output.
///
/// Fails with [`PortableError::NonZeroExit`] on a non-zero exit code
/// and [`PortableError::CommandTimeout`] when the deadline passes; in
/// the timeout case the child is killed before returning.
pub async fn run_capture(spec: &CommandSpec, timeout: Duration) -> Result<CapturedOutput> {
    debug!("Running `{}`", spec.display());

    let mut cmd = spec.build();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| PortableError::Io {
        message: format!("Failed to spawn `{}`: {e}", spec.display()),
        path: Some(spec.program.clone()),
        source: Some(e),
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| PortableError::Io {
            message: format!("Failed waiting for `{}`: {e}", spec.display()),
            path: None,
            source: Some(e),
        })?,
        Err(_) => {
            return Err(PortableError::CommandTimeout {
                command: spec.display(),
                timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(PortableError::NonZeroExit {
            command: spec.display(),
            code: output.status.code().unwrap_or(-1),
            stderr_tail: tail(&stderr, STDERR_TAIL_LEN),
        });
    }

    Ok(CapturedOutput { stdout, stderr })
}

/// Spawn a long-running command with inherited stdio.
///
/// The server process writes directly to the launcher's terminal; the
/// caller owns the [`Child`] and decides when to wait or kill. A child
/// still running when its handle drops is killed, not leaked.
pub fn spawn(spec: &CommandSpec) -> Result<Child> {
    debug!("Spawning `{}`", spec.display());

    let mut cmd = spec.build();
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    cmd.spawn().map_err(|e| PortableError::Io {
        message: format!("Failed to spawn `{}`: {e}", spec.display()),
        path: Some(spec.program.clone()),
        source: Some(e),
    })
}

/// Wait for a spawned child, bounded by a deadline.
///
/// On timeout the child is killed and reaped before the error returns,
/// so no process outlives the reported failure.
pub async fn wait_bounded(
    child: &mut Child,
    spec: &CommandSpec,
    timeout: Duration,
) -> Result<std::process::ExitStatus> {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.map_err(|e| PortableError::Io {
            message: format!("Failed waiting for `{}`: {e}", spec.display()),
            path: None,
            source: Some(e),
        }),
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(PortableError::CommandTimeout {
                command: spec.display(),
                timeout,
            })
        }
    }
}

/// Poll a condition once per second until it holds or the deadline passes.
pub async fn wait_for<F>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if condition() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PortableError::WaitTimeout {
                what: what.to_string(),
                timeout,
            });
        }
        tokio::time::sleep(InstallConfig::POLL_INTERVAL).await;
    }
}

fn tail(text: &str, len: usize) -> String {
    let trimmed = text.trim_end();
    if trimmed.len() <= len {
        trimmed.to_string()
    } else {
        let start = trimmed.len() - len;
        // Avoid splitting a UTF-8 character
        let start = (start..trimmed.len())
            .find(|i| trimmed.is_char_boundary(*i))
            .unwrap_or(start);
        trimmed[start..].to_string()
    }
}
