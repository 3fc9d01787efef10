//! Process Runner
//!
//! Runs external tools and captures their combined output. The runner never
//! interprets output: success criteria belong to the caller.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Process runner errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start {executable:?}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{executable:?} exited with {exit_code:?}:\n{output}")]
    ToolInvocation {
        executable: PathBuf,
        exit_code: Option<i32>,
        output: String,
    },
    #[error("{executable:?} timed out after {timeout:?}")]
    TimedOut { executable: PathBuf, timeout: Duration },
}

impl From<ProcessError> for crate::ForgeError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::ToolInvocation { executable, output, .. } => crate::ForgeError::ToolInvocation {
                tool: executable.to_string_lossy().to_string(),
                output,
            },
            ProcessError::TimedOut { executable, timeout } => crate::ForgeError::ToolInvocation {
                tool: executable.to_string_lossy().to_string(),
                output: format!("timed out after {:?}", timeout),
            },
            spawn @ ProcessError::Spawn { .. } => crate::ForgeError::Configuration(spawn.to_string()),
        }
    }
}

/// One external tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Turn a nonzero exit into `ProcessError::ToolInvocation`
    pub fail_on_nonzero_exit: bool,
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Invocation that reports failures through `ProcessOutput::succeeded` only
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            fail_on_nonzero_exit: false,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn fail_on_nonzero_exit(mut self, fail: bool) -> Self {
        self.fail_on_nonzero_exit = fail;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human readable command line, for logs
    pub fn command_line(&self) -> String {
        let mut line = self.executable.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    /// stdout followed by stderr
    pub full_output: String,
    pub succeeded: bool,
}

impl ProcessOutput {
    pub fn new(exit_code: i32, full_output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            full_output: full_output.into(),
            succeeded: exit_code == 0,
        }
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.full_output.contains(marker)
    }
}

/// Executes external programs
pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ProcessOutput, ProcessError>>;
}

/// Runner backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        debug!("Running: {}", invocation.command_line());

        let mut cmd = Command::new(&invocation.executable);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = invocation.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            executable: invocation.executable.clone(),
            source,
        })?;

        let waited = match invocation.timeout {
            // dropping the future kills the child
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| ProcessError::TimedOut {
                    executable: invocation.executable.clone(),
                    timeout,
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| ProcessError::Spawn {
            executable: invocation.executable.clone(),
            source,
        })?;

        let mut full_output = String::from_utf8_lossy(&output.stdout).to_string();
        full_output.push_str(&String::from_utf8_lossy(&output.stderr));

        let result = ProcessOutput {
            exit_code: output.status.code(),
            full_output,
            succeeded: output.status.success(),
        };
        debug!("Exit code {:?}", result.exit_code);

        if invocation.fail_on_nonzero_exit && !result.succeeded {
            return Err(ProcessError::ToolInvocation {
                executable: invocation.executable.clone(),
                exit_code: result.exit_code,
                output: result.full_output,
            });
        }

        Ok(result)
    }
}
