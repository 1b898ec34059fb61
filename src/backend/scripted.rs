//! Scripted backend for unit tests
//!
//! Records every command and answers from a reply function instead of
//! spawning processes.

use crate::backend::{Backend, BackendCommand, CommandOutput};
use crate::error::{StepError, StepResult};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;

/// Canned result for one command
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Reply {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn ok_with(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn fail(stderr: &str) -> Self {
        Self {
            code: 1,
            stderr: stderr.to_string(),
            ..Self::default()
        }
    }
}

type Responder = Box<dyn Fn(&BackendCommand) -> Reply + Send + Sync>;

pub struct ScriptedBackend {
    responder: Responder,
    calls: Mutex<Vec<BackendCommand>>,
    blocking: Mutex<Vec<BackendCommand>>,
}

impl ScriptedBackend {
    pub fn new(responder: impl Fn(&BackendCommand) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            blocking: Mutex::new(Vec::new()),
        }
    }

    /// Backend where every command succeeds silently
    pub fn succeeding() -> Self {
        Self::new(|_| Reply::ok())
    }

    /// Commands seen by the async entry points, in order
    pub fn calls(&self) -> Vec<BackendCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines, in order
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.to_string()).collect()
    }

    /// Commands executed through `run_blocking`
    pub fn blocking_calls(&self) -> Vec<BackendCommand> {
        self.blocking.lock().unwrap().clone()
    }

    fn reply(&self, cmd: &BackendCommand) -> Reply {
        self.calls.lock().unwrap().push(cmd.clone());
        (self.responder)(cmd)
    }
}

fn exit_error(cmd: &BackendCommand, code: i32) -> StepError {
    StepError::CommandExit {
        command: cmd.to_string(),
        code,
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn output(&self, cmd: &BackendCommand) -> StepResult<CommandOutput> {
        let reply = self.reply(cmd);
        Ok(CommandOutput {
            code: Some(reply.code),
            stdout: reply.stdout,
            stderr: reply.stderr,
        })
    }

    async fn stream(&self, cmd: &BackendCommand, sink: &mut (dyn Write + Send)) -> StepResult<()> {
        let reply = self.reply(cmd);
        sink.write_all(reply.stdout.as_bytes())
            .and_then(|_| sink.write_all(reply.stderr.as_bytes()))
            .map_err(|e| StepError::io("writing scripted output", e))?;
        if reply.code == 0 {
            Ok(())
        } else {
            Err(exit_error(cmd, reply.code))
        }
    }

    async fn spawn_detached(&self, cmd: &BackendCommand) -> StepResult<()> {
        let reply = self.reply(cmd);
        if reply.code == 0 {
            Ok(())
        } else {
            Err(exit_error(cmd, reply.code))
        }
    }

    fn run_blocking(&self, cmd: &BackendCommand) -> StepResult<()> {
        self.blocking.lock().unwrap().push(cmd.clone());
        let reply = (self.responder)(cmd);
        if reply.code == 0 {
            Ok(())
        } else {
            Err(exit_error(cmd, reply.code))
        }
    }

    fn backend_name(&self) -> &'static str {
        "Scripted"
    }
}
