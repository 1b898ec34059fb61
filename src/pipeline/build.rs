//! Build invocation, optionally tapped for cache metrics

use crate::backend::{Backend, BackendCommand};
use crate::error::{StepError, StepResult};
use crate::metrics;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the build with its output going straight to `console`
pub async fn run_plain<W>(backend: &dyn Backend, cmd: &BackendCommand, mut console: W) -> StepResult<()>
where
    W: Write + Send,
{
    backend.stream(cmd, &mut console).await
}

/// Run the build through the line tee and write the cache report.
///
/// The output pump owns the tee and runs on its own task; this task drains
/// the metrics channel. The pump's result is only inspected after both are
/// done. Report failures are logged, never returned.
pub async fn run_with_metrics<W>(
    backend: Arc<dyn Backend>,
    cmd: BackendCommand,
    console: W,
    report: &Path,
) -> StepResult<()>
where
    W: Write + Send + 'static,
{
    let (mut writer, rx) = metrics::tee(console);
    let pump = tokio::spawn(async move {
        let result = backend.stream(&cmd, &mut writer).await;
        drop(writer);
        result
    });

    let metrics = metrics::collect(rx).await;
    let pumped = pump.await;

    debug!(
        "Build reported {} layers ({} cached)",
        metrics.total_layers, metrics.cached
    );
    match metrics.write_to(report).await {
        Ok(()) => info!("Wrote cache metrics to {}", report.display()),
        Err(e) => warn!("Could not write cache metrics: {}", e),
    }

    match pumped {
        Ok(result) => result,
        Err(e) => Err(StepError::Internal(format!("build output task failed: {}", e))),
    }
}
