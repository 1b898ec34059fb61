//! Scoped ownership of an ephemeral builder

use crate::backend::Backend;
use crate::command;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Removes the named builder exactly once.
///
/// Call [`BuilderGuard::teardown`] on the normal path. A guard dropped
/// without it (early return, panic unwinding) removes the builder with a
/// blocking call instead.
pub struct BuilderGuard {
    name: String,
    docker: String,
    backend: Arc<dyn Backend>,
    released: bool,
}

impl BuilderGuard {
    pub fn new(name: impl Into<String>, docker: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            docker: docker.into(),
            backend,
            released: false,
        }
    }

    /// Builder name as reported by `buildx create`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the builder; failures are logged only
    pub async fn teardown(mut self) {
        self.released = true;
        let cmd = command::builder_remove(&self.docker, &self.name);
        match self.backend.output(&cmd).await {
            Ok(out) if out.success() => debug!("Removed builder {}", self.name),
            Ok(out) => warn!("Could not remove builder {}: {}", self.name, out.combined().trim()),
            Err(e) => warn!("Could not remove builder {}: {}", self.name, e),
        }
    }
}

impl fmt::Debug for BuilderGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderGuard")
            .field("name", &self.name)
            .field("docker", &self.docker)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for BuilderGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let cmd = command::builder_remove(&self.docker, &self.name);
        if let Err(e) = self.backend.run_blocking(&cmd) {
            warn!("Could not remove builder {}: {}", self.name, e);
        }
    }
}
