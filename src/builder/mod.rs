//! Ephemeral buildx builder lifecycle
//!
//! A builder is created with the new-format driver options first. If that
//! create or its bootstrap fails, a second attempt uses the legacy options,
//! optionally pinned to a known buildkit image. Only the second attempt's
//! failures are fatal.

mod guard;
mod preload;

pub use guard::BuilderGuard;
pub use preload::discover as discover_preloaded;

use crate::backend::{Backend, CommandOutput};
use crate::command::{self, DEFAULT_DRIVER, DOCKER_CONTAINER_DRIVER};
use crate::config::{BuildConfig, BuilderConfig};
use crate::error::{StepError, StepResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Driver to provision with, or `None` when the daemon's builder suffices.
///
/// Cache export is unsupported on the `docker` driver, so requesting
/// `cache_to` forces `docker-container`.
pub fn effective_driver(builder: &BuilderConfig, build: &BuildConfig) -> Option<String> {
    let requested = builder.driver.as_deref().unwrap_or_default();
    let uses_default = requested.is_empty() || requested == DEFAULT_DRIVER;

    if !build.cache_to.is_empty() && uses_default {
        debug!("cache_to requires the {} driver", DOCKER_CONTAINER_DRIVER);
        return Some(DOCKER_CONTAINER_DRIVER.to_string());
    }
    if uses_default {
        None
    } else {
        Some(requested.to_string())
    }
}

fn builder_name(out: &CommandOutput, config: &BuilderConfig) -> Option<String> {
    let reported = out.stdout.trim();
    if !reported.is_empty() {
        return Some(reported.to_string());
    }
    config.name.clone().filter(|n| !n.is_empty())
}

/// Creates and bootstraps the builder for one run
pub struct BuilderLifecycle<'a> {
    backend: Arc<dyn Backend>,
    docker: &'a str,
    config: &'a BuilderConfig,
}

impl<'a> BuilderLifecycle<'a> {
    pub fn new(backend: Arc<dyn Backend>, docker: &'a str, config: &'a BuilderConfig) -> Self {
        Self {
            backend,
            docker,
            config,
        }
    }

    /// Provision a builder for `driver`.
    ///
    /// `preloaded` is the version of a buildkit image already loaded into
    /// the daemon; it takes precedence over the configured version when
    /// pinning the fallback attempt.
    pub async fn provision(&self, driver: &str, preloaded: Option<&str>) -> StepResult<BuilderGuard> {
        if !self.config.driver_opts_new.is_empty() {
            match self.primary(driver).await {
                Ok(guard) => return Ok(guard),
                Err(e) => warn!("Falling back to legacy driver options: {}", e),
            }
        }
        self.fallback(driver, preloaded).await
    }

    async fn primary(&self, driver: &str) -> StepResult<BuilderGuard> {
        let guard = self.attempt(driver, &self.config.driver_opts_new).await?;
        info!("Builder {} ready with new driver options", guard.name());
        Ok(guard)
    }

    async fn fallback(&self, driver: &str, preloaded: Option<&str>) -> StepResult<BuilderGuard> {
        let mut opts = self.config.driver_opts.clone();
        let version = preloaded.or(self.config.buildkit_version.as_deref().filter(|v| !v.is_empty()));
        if let Some(version) = version {
            info!("Using buildkit version {}", version);
            command::update_image_version(&mut opts, version);
        }

        let guard = self.attempt(driver, &opts).await?;
        info!("Builder {} ready", guard.name());
        Ok(guard)
    }

    /// Create then bootstrap; a created builder is removed again if the
    /// bootstrap fails
    async fn attempt(&self, driver: &str, opts: &[String]) -> StepResult<BuilderGuard> {
        let create = command::builder_create(self.docker, self.config, driver, opts);
        let out = self.backend.output(&create).await?;
        if !out.success() {
            return Err(StepError::BuilderCreate(out.combined().trim().to_string()));
        }
        let name = builder_name(&out, self.config)
            .ok_or_else(|| StepError::BuilderCreate("buildx did not report a builder name".to_string()))?;
        let guard = BuilderGuard::new(name, self.docker, self.backend.clone());

        if let Err(e) = self.bootstrap(guard.name()).await {
            guard.teardown().await;
            return Err(e);
        }
        Ok(guard)
    }

    async fn bootstrap(&self, name: &str) -> StepResult<()> {
        let out = self.backend.output(&command::builder_inspect(self.docker, name)).await?;
        if out.success() {
            Ok(())
        } else {
            Err(StepError::BuilderBootstrap {
                name: name.to_string(),
                output: out.combined().trim().to_string(),
            })
        }
    }
}
