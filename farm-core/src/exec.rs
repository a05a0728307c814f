//! Direct process execution with per-invocation timeouts
//!
//! Every external tool branchfarm drives (git, hook scripts) goes through
//! [`run`]. Commands are typed argument vectors executed without a shell.
//! On unix each command leads its own process group; when its timeout elapses
//! the whole group is killed, so processes a hook script started in the
//! background die with it. Dropping the future only kills the direct child.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::{Error, Result};

/// Default timeout applied when a spec does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// A command to execute: program, arguments, working directory, environment
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Executable name or path
    pub program: String,
    /// Arguments, passed verbatim
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
    /// Time after which the child is killed
    pub timeout: Duration,
}

impl CommandSpec {
    /// Create a spec for `program` running in `cwd`
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            env: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render the command line for log output
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run a command to completion, returning its output if it succeeded
///
/// Fails with [`Error::Spawn`] if the program cannot be started,
/// [`Error::Timeout`] if it outlives `spec.timeout`, and
/// [`Error::CommandFailed`] on a non-zero exit.
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput> {
    let output = run_unchecked(spec).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(Error::CommandFailed {
            program: spec.program.clone(),
            cwd: spec.cwd.clone(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Run a command to completion without checking its exit status
pub async fn run_unchecked(spec: &CommandSpec) -> Result<CommandOutput> {
    tracing::debug!(cwd = %spec.cwd.display(), "exec: {}", spec.display());

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|source| Error::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let pid = child.id();

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(result) => {
            let output = result?;
            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        Err(_) => {
            kill_process_group(pid);
            Err(Error::Timeout {
                program: spec.program.clone(),
                cwd: spec.cwd.clone(),
                after: spec.timeout,
            })
        }
    }
}

/// Kill every process left in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };

    // ESRCH just means the group already exited
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(pgid = pid, "killpg failed: {}", e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
