//! Cache metrics extraction
//!
//! Buildx prints one progress line per build step, e.g. `#7 DONE 0.4s` or
//! `#5 CACHED`. The collector folds those into a per-layer report that is
//! written as JSON once the build output closes.

mod tee;

pub use tee::{tee, LineTee, TEE_CAPACITY};

use crate::error::{StepError, StepResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::debug;

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"#(\d+) (DONE|CACHED|ERRORED|CANCELED)(?: ([0-9.]+)s)?")
            .unwrap_or_else(|e| unreachable!("status pattern is valid: {}", e))
    })
}

/// Terminal state of one build step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Done,
    Cached,
    Errored,
    Canceled,
}

impl Status {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "DONE" => Some(Self::Done),
            "CACHED" => Some(Self::Cached),
            "ERRORED" => Some(Self::Errored),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// Status of a layer plus elapsed seconds when buildx reported them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// One entry of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub index: u32,
    pub layer_status: LayerStatus,
}

/// Finalized cache report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub total_layers: u32,
    pub done: u32,
    pub cached: u32,
    pub errored: u32,
    pub canceled: u32,
    /// Sorted by index, one entry per index
    pub layers: Vec<Layer>,
}

impl CacheMetrics {
    /// Write the report as pretty JSON, creating parent directories
    pub async fn write_to(&self, path: &Path) -> StepResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StepError::io(format!("creating {}", parent.display()), e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .map_err(|e| StepError::io(format!("writing cache metrics {}", path.display()), e))?;
        Ok(())
    }
}

/// Incremental state while build output is still arriving
#[derive(Debug, Default)]
pub struct MetricsCollector {
    done: u32,
    cached: u32,
    errored: u32,
    canceled: u32,
    layers: BTreeMap<u32, LayerStatus>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every status occurrence in `line`
    pub fn observe_line(&mut self, line: &str) {
        for caps in status_pattern().captures_iter(line) {
            let Ok(index) = caps[1].parse::<u32>() else {
                continue;
            };
            let Some(status) = Status::parse(&caps[2]) else {
                continue;
            };
            // Only a finished step has a meaningful duration.
            let time = if status == Status::Done {
                caps.get(3).and_then(|t| t.as_str().parse::<f64>().ok())
            } else {
                None
            };

            match status {
                Status::Done => self.done += 1,
                Status::Cached => self.cached += 1,
                Status::Errored => self.errored += 1,
                Status::Canceled => self.canceled += 1,
            }
            // Later reports of the same step replace earlier ones.
            self.layers.insert(index, LayerStatus { status, time });
        }
    }

    pub fn finish(self) -> CacheMetrics {
        CacheMetrics {
            total_layers: self.done + self.cached + self.errored + self.canceled,
            done: self.done,
            cached: self.cached,
            errored: self.errored,
            canceled: self.canceled,
            layers: self
                .layers
                .into_iter()
                .map(|(index, layer_status)| Layer {
                    index,
                    layer_status,
                })
                .collect(),
        }
    }
}

/// Drain `rx` until every sender is gone, then finalize
pub async fn collect(mut rx: mpsc::Receiver<String>) -> CacheMetrics {
    let mut collector = MetricsCollector::new();
    let mut lines = 0usize;
    while let Some(line) = rx.recv().await {
        collector.observe_line(&line);
        lines += 1;
    }
    debug!("Cache metrics drained {} lines", lines);
    collector.finish()
}
