//! Git subprocess execution.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use super::command::GitCommand;
use super::error::GitCommandError;

/// Captured output of a successful git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded and redacted.
    pub stderr: String,
}

impl GitOutput {
    /// Standard output with surrounding whitespace removed.
    #[must_use]
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs git commands on behalf of the engine.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Runs `command` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`GitCommandError`] when git cannot be started or exits with a
    /// non-zero status.
    async fn run(&self, command: &GitCommand) -> Result<GitOutput, GitCommandError>;

    /// Runs `command`, passing each standard error line to `on_line` as it
    /// arrives. Carriage returns end a line so in-place progress updates are
    /// observed individually.
    ///
    /// # Errors
    ///
    /// Returns [`GitCommandError`] when git cannot be started or exits with a
    /// non-zero status.
    async fn run_streaming(
        &self,
        command: &GitCommand,
        on_line: &(dyn for<'line> Fn(&'line str) + Send + Sync),
    ) -> Result<GitOutput, GitCommandError>;
}

/// [`GitRunner`] backed by the `git` executable.
///
/// Child processes are killed when the future driving them is dropped, so
/// abandoning a reproduction does not leave orphaned git processes.
#[derive(Debug, Clone)]
pub struct CommandGitRunner {
    program: OsString,
}

impl Default for CommandGitRunner {
    fn default() -> Self {
        Self {
            program: OsString::from("git"),
        }
    }
}

impl CommandGitRunner {
    /// Uses an explicit git executable.
    #[must_use]
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build(&self, command: &GitCommand) -> Command {
        let mut process = Command::new(&self.program);
        process
            .args(command.args())
            .env("GIT_TERMINAL_PROMPT", "0")
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = command.cwd() {
            process.current_dir(dir);
        }
        process
    }
}

fn spawn_error(command: &GitCommand, error: &std::io::Error) -> GitCommandError {
    GitCommandError::Spawn {
        command: command.display(),
        message: error.to_string(),
    }
}

fn finish(
    command: &GitCommand,
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<GitOutput, GitCommandError> {
    let output = GitOutput {
        stdout: String::from_utf8_lossy(stdout).into_owned(),
        stderr: command.redact(&String::from_utf8_lossy(stderr)),
    };

    if status.success() {
        Ok(output)
    } else {
        Err(GitCommandError::Failed {
            command: command.display(),
            status: status.to_string(),
            stderr: output.stderr.trim().to_owned(),
        })
    }
}

async fn read_all<R>(reader: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut stream) = reader {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn read_lines<R>(
    reader: Option<R>,
    command: &GitCommand,
    on_line: &(dyn for<'line> Fn(&'line str) + Send + Sync),
) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let Some(mut stream) = reader else {
        return Ok(collected);
    };

    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0_u8; 4096];
    let emit = |line: &[u8]| {
        if !line.is_empty() {
            on_line(&command.redact(&String::from_utf8_lossy(line)));
        }
    };

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        for &byte in chunk.get(..read).unwrap_or_default() {
            collected.push(byte);
            if byte == b'\r' || byte == b'\n' {
                emit(&pending);
                pending.clear();
            } else {
                pending.push(byte);
            }
        }
    }
    emit(&pending);
    Ok(collected)
}

#[async_trait]
impl GitRunner for CommandGitRunner {
    async fn run(&self, command: &GitCommand) -> Result<GitOutput, GitCommandError> {
        debug!(command = %command.display(), "running git");
        let output = self
            .build(command)
            .output()
            .await
            .map_err(|error| spawn_error(command, &error))?;
        finish(command, output.status, &output.stdout, &output.stderr)
    }

    async fn run_streaming(
        &self,
        command: &GitCommand,
        on_line: &(dyn for<'line> Fn(&'line str) + Send + Sync),
    ) -> Result<GitOutput, GitCommandError> {
        debug!(command = %command.display(), "running git with progress");
        let mut child = self
            .build(command)
            .spawn()
            .map_err(|error| spawn_error(command, &error))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout_bytes, stderr_bytes) = tokio::try_join!(
            read_all(stdout),
            read_lines(stderr, command, on_line)
        )
        .map_err(|error| spawn_error(command, &error))?;

        let status = child
            .wait()
            .await
            .map_err(|error| spawn_error(command, &error))?;
        finish(command, status, &stdout_bytes, &stderr_bytes)
    }
}
