//! Backend runtime abstraction
//!
//! Provides a trait for running synthesized commands that can be implemented
//! by the real docker CLI runner or replaced in tests.

use crate::backend::{BackendCommand, CommandOutput};
use crate::error::StepResult;
use async_trait::async_trait;
use std::io::Write;

/// Abstract build backend interface
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run to completion and capture stdout/stderr.
    ///
    /// A non-zero exit is not an error here; callers inspect the output.
    async fn output(&self, cmd: &BackendCommand) -> StepResult<CommandOutput>;

    /// Run to completion, copying stdout and stderr into `sink` as they arrive.
    ///
    /// Returns an error when the process exits unsuccessfully.
    async fn stream(&self, cmd: &BackendCommand, sink: &mut (dyn Write + Send)) -> StepResult<()>;

    /// Start a long-running process without waiting for it
    async fn spawn_detached(&self, cmd: &BackendCommand) -> StepResult<()>;

    /// Run synchronously; usable from `Drop`
    fn run_blocking(&self, cmd: &BackendCommand) -> StepResult<()>;

    /// Get the human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}
