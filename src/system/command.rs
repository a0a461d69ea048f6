//! Host command execution.
//!
//! Everything the restorer does to the host goes through [`CommandRunner`],
//! so the pipeline can be driven against a simulated host in tests.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{RestoreError, Result};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[cfg(test)]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[cfg(test)]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Turn a non-zero exit into an error.
    pub fn into_result(self, command: &str) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        if self.stderr.contains("Operation not permitted") || self.stderr.contains("Permission denied")
        {
            return Err(RestoreError::PermissionDenied);
        }
        let message = match (self.stderr.trim(), self.code) {
            ("", Some(code)) => format!("exit status {}", code),
            ("", None) => "terminated by signal".to_string(),
            (stderr, _) => stderr.to_string(),
        };
        Err(RestoreError::CommandFailed {
            command: command.to_string(),
            message,
        })
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// A planned command, built by the `system` modules and run by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: &'static str, args: &[&str]) -> Self {
        Self {
            program,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }

    pub fn line(&self) -> String {
        display(self.program, &self.arg_refs())
    }
}

/// Render a command line for logs and error messages.
pub fn display(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. `Err` only when the command could not be run at all.
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Like [`CommandRunner::run`], abandoning (and killing) the command after `limit`.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        limit: Duration,
    ) -> Result<CommandOutput>;

    /// Whether `program` is installed.
    fn has_program(&self, program: &str) -> bool;

    /// Run and map a non-zero exit to an error.
    async fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run(program, args)
            .await?
            .into_result(&display(program, args))
    }

    /// Run a probe; any failure counts as `false`.
    async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        matches!(self.run(program, args).await, Ok(output) if output.success)
    }
}

/// Runs commands on the real host via `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

/// Searched in addition to `$PATH`; sudo often strips the sbin directories.
const SBIN_DIRS: &[&str] = &["/usr/local/sbin", "/usr/sbin", "/sbin"];

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let command = display(program, args);
        tracing::debug!(%command, "running");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RestoreError::CommandFailed {
                command: command.clone(),
                message: e.to_string(),
            })?;

        let output = CommandOutput::from(output);
        if !output.success {
            tracing::debug!(%command, code = ?output.code, stderr = %output.stderr.trim(), "non-zero exit");
        }
        Ok(output)
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        limit: Duration,
    ) -> Result<CommandOutput> {
        match tokio::time::timeout(limit, self.run(program, args)).await {
            Ok(result) => result,
            Err(_) => Err(RestoreError::CommandTimedOut {
                command: display(program, args),
                seconds: limit.as_secs(),
            }),
        }
    }

    fn has_program(&self, program: &str) -> bool {
        use std::os::unix::fs::PermissionsExt;

        let path_dirs: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();

        path_dirs
            .into_iter()
            .chain(SBIN_DIRS.iter().map(PathBuf::from))
            .map(|dir| dir.join(program))
            .any(|candidate| {
                candidate
                    .metadata()
                    .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                    .unwrap_or(false)
            })
    }
}
