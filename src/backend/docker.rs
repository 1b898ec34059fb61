//! Docker CLI backend
//!
//! Implements the Backend trait by executing the docker (or dockerd)
//! executable named in each command.

use crate::backend::{Backend, BackendCommand, CommandOutput};
use crate::error::{StepError, StepResult};
use async_trait::async_trait;
use std::io::Write;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Backend that shells out to the docker CLI
pub struct DockerCli;

impl DockerCli {
    /// Create a new docker CLI backend
    pub fn new() -> Self {
        Self
    }

    fn command(cmd: &BackendCommand) -> Command {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        command.stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command
    }

    fn spawn(cmd: &BackendCommand, mut command: Command) -> StepResult<Child> {
        let mut child = command
            .spawn()
            .map_err(|e| StepError::command_failed(cmd.to_string(), e))?;

        // Feed stdin from a separate task so a chatty process cannot deadlock
        // against a full stdout pipe.
        if let (Some(input), Some(mut child_in)) = (cmd.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = child_in.write_all(&input).await {
                    debug!("Writing process stdin failed: {}", e);
                }
                // Dropping closes the pipe.
            });
        }

        Ok(child)
    }

    fn check_status(cmd: &BackendCommand, status: ExitStatus) -> StepResult<()> {
        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(StepError::CommandExit {
                command: cmd.to_string(),
                code,
            }),
            None => Err(StepError::ProcessSignaled(cmd.to_string())),
        }
    }
}

/// Write out and clear `buf`; after the first sink failure output is discarded
fn forward(
    sink: &mut (dyn Write + Send),
    buf: &mut Vec<u8>,
    failed: &mut Option<std::io::Error>,
) {
    if !buf.is_empty() && failed.is_none() {
        if let Err(e) = sink.write_all(buf) {
            *failed = Some(e);
        }
    }
    buf.clear();
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for DockerCli {
    async fn output(&self, cmd: &BackendCommand) -> StepResult<CommandOutput> {
        debug!("Executing: {:?}", cmd);

        let mut command = Self::command(cmd);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let child = Self::spawn(cmd, command)?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| StepError::command_failed(cmd.to_string(), e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn stream(&self, cmd: &BackendCommand, sink: &mut (dyn Write + Send)) -> StepResult<()> {
        debug!("Streaming: {:?}", cmd);

        let mut command = Self::command(cmd);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = Self::spawn(cmd, command)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StepError::Internal("stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StepError::Internal("stderr not piped".to_string()))?;

        let mut stdout_reader = BufReader::new(stdout);
        let mut stderr_reader = BufReader::new(stderr);

        // Partial reads stay in these buffers when the other branch wins the
        // select; an unterminated tail is forwarded once its stream hits EOF.
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;
        // First sink failure; the pipes are still drained so the child can exit.
        let mut sink_err: Option<std::io::Error> = None;

        while !stdout_done || !stderr_done {
            tokio::select! {
                read = stdout_reader.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                    if let Err(e) = &read {
                        warn!("Reading stdout of {} failed: {}", cmd.program, e);
                    }
                    stdout_done = !matches!(read, Ok(n) if n > 0);
                    forward(sink, &mut stdout_buf, &mut sink_err);
                }
                read = stderr_reader.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                    if let Err(e) = &read {
                        warn!("Reading stderr of {} failed: {}", cmd.program, e);
                    }
                    stderr_done = !matches!(read, Ok(n) if n > 0);
                    forward(sink, &mut stderr_buf, &mut sink_err);
                }
            }
        }
        if sink_err.is_none() {
            if let Err(e) = sink.flush() {
                sink_err = Some(e);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| StepError::command_failed(cmd.to_string(), e))?;
        if let Some(e) = sink_err {
            return Err(StepError::io("writing build output", e));
        }
        Self::check_status(cmd, status)
    }

    async fn spawn_detached(&self, cmd: &BackendCommand) -> StepResult<()> {
        debug!("Starting in background: {:?}", cmd);

        let mut command = Self::command(cmd);
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        let child = Self::spawn(cmd, command)?;
        if let Some(pid) = child.id() {
            debug!("{} running with pid {}", cmd.program, pid);
        }
        Ok(())
    }

    fn run_blocking(&self, cmd: &BackendCommand) -> StepResult<()> {
        debug!("Executing synchronously: {:?}", cmd);

        let status = std::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| StepError::command_failed(cmd.to_string(), e))?;
        Self::check_status(cmd, status)
    }

    fn backend_name(&self) -> &'static str {
        "Docker CLI"
    }
}
