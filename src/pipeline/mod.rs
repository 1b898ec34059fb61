//! Build step supervisor
//!
//! Runs the step in order: daemon and readiness wait, registry auth,
//! builder provisioning, build, builder teardown, artifact, cleanup.
//! Failures of `rmi` and `prune` are downgraded to warnings, as is a daemon
//! that never answers the readiness check; every other failure ends the run.

mod build;

pub use build::{run_plain, run_with_metrics};

use crate::artifact::{self, PushedImage};
use crate::backend::{Backend, BackendCommand};
use crate::builder::{self, BuilderGuard, BuilderLifecycle};
use crate::command::{self, BuildInvocation};
use crate::config::{Config, LoginConfig};
use crate::error::{StepError, StepResult};
use crate::ui::{self, TaskSpinner, UiContext};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Output marker of a successful `docker login`
const LOGIN_SUCCEEDED: &str = "Login Succeeded";

/// How long to wait for the daemon to answer `docker info`
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            interval: Duration::from_secs(1),
        }
    }
}

/// One build step run over a fixed configuration
pub struct Pipeline {
    config: Config,
    backend: Arc<dyn Backend>,
    ui: UiContext,
    readiness: ReadinessPolicy,
}

impl Pipeline {
    pub fn new(config: Config, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            backend,
            ui: UiContext::detect(),
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn with_ui(mut self, ui: UiContext) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    fn docker(&self) -> &str {
        &self.config.pipeline.docker_exe
    }

    /// Run every step; the returned error is the single fatal failure
    pub async fn run(&self) -> StepResult<()> {
        debug!("Using {} backend", self.backend.backend_name());

        self.start_daemon().await;
        self.wait_for_daemon().await;

        self.report_credentials();
        self.write_auth_file().await?;
        self.login().await?;

        let guard = self.provision_builder().await?;
        let built = self.diagnose_and_build(guard.as_ref()).await;
        if let Some(guard) = guard {
            guard.teardown().await;
        }
        built?;

        self.write_artifact().await;
        self.cleanup().await?;
        Ok(())
    }

    /// Trace and run a command with its output on the console
    async fn exec(&self, cmd: &BackendCommand) -> StepResult<()> {
        ui::trace(&self.ui, cmd);
        match run_plain(self.backend.as_ref(), cmd, std::io::stdout()).await {
            Ok(()) => Ok(()),
            Err(e) if cmd.kind.is_ignorable() => {
                warn!("Ignoring failed {}: {}", cmd.subcommand().join(" "), e);
                ui::step_warn(&self.ui, &format!("Could not run {}. Ignoring...", cmd));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn start_daemon(&self) {
        if self.config.daemon.disabled {
            return;
        }
        let cmd = command::daemon(&self.config.daemon, &self.config.login.registry);
        ui::trace(&self.ui, &cmd);
        if let Err(e) = self.backend.spawn_detached(&cmd).await {
            warn!("Could not start docker daemon: {}", e);
        }
    }

    async fn wait_for_daemon(&self) {
        let ping = command::info(self.docker());
        let attempts = self.readiness.attempts.max(1);
        let mut spinner = TaskSpinner::new(&self.ui);
        spinner.start("Waiting for docker daemon...");

        for n in 1..=attempts {
            spinner.attempt(n, attempts);
            match self.backend.output(&ping).await {
                Ok(out) if out.success() => {
                    spinner.stop("Docker daemon ready");
                    return;
                }
                Ok(out) => debug!("Daemon not ready: {}", out.stderr.trim()),
                Err(e) => debug!("Daemon not ready yet: {}", e),
            }
            if n < attempts {
                tokio::time::sleep(self.readiness.interval).await;
            }
        }
        spinner.stop_warn(&format!(
            "Unable to reach Docker Daemon after {} attempts.",
            attempts
        ));
    }

    fn report_credentials(&self) {
        let login = &self.config.login;
        let message = match (login.has_password(), login.has_config(), login.has_access_token()) {
            (true, true, _) => "Detected registry credentials and registry credentials file",
            (true, false, _) => "Detected registry credentials",
            (false, true, _) => "Detected registry credentials file",
            (false, false, true) => "Detected access token",
            (false, false, false) => {
                "Registry credentials or Docker config not provided. Guest mode enabled."
            }
        };
        ui::step_info(&self.ui, message);
    }

    async fn write_auth_file(&self) -> StepResult<()> {
        let login = &self.config.login;
        let Some(content) = login.config.as_deref().filter(|c| !c.is_empty()) else {
            return Ok(());
        };
        let path = artifact::write_auth_file(
            &self.config.pipeline.docker_home(),
            content,
            self.config.base_image.as_ref(),
        )
        .await?;
        info!("Wrote registry config to {}", path.display());
        Ok(())
    }

    async fn login(&self) -> StepResult<()> {
        if let Some(base) = self.config.base_image.as_ref().filter(|b| !b.registry.is_empty()) {
            if base.username.as_deref().unwrap_or_default().is_empty() {
                ui::step_warn_hint(
                    &self.ui,
                    "Base image registry username is empty",
                    "the base image connector requires authenticated access",
                );
            }
            if !base.has_password() {
                ui::step_warn_hint(
                    &self.ui,
                    "Base image registry password is empty",
                    "the base image connector requires authenticated access",
                );
            }
            self.login_password(base).await?;
        }

        let login = &self.config.login;
        if login.has_password() {
            self.login_password(login).await
        } else if let Some(token) = login.access_token.as_deref().filter(|t| !t.is_empty()) {
            self.login_token(&login.registry, token).await
        } else {
            Ok(())
        }
    }

    async fn login_password(&self, login: &LoginConfig) -> StepResult<()> {
        let cmd = command::login(self.docker(), login);
        debug!("Logging in to {}", login.registry);
        let out = self.backend.output(&cmd).await?;
        if !out.success() {
            return Err(StepError::Auth {
                registry: login.registry.clone(),
                output: command::scrub_password_warning(&out.combined()),
            });
        }
        ui::step_ok(&self.ui, &format!("Logged in to {}", login.registry));
        Ok(())
    }

    async fn login_token(&self, registry: &str, token: &str) -> StepResult<()> {
        let cmd = command::login_access_token(self.docker(), registry, token);
        let out = self.backend.output(&cmd).await?;
        let combined = out.combined();
        if !out.success() {
            return Err(StepError::Auth {
                registry: registry.to_string(),
                output: command::scrub_password_warning(&combined),
            });
        }
        if !combined.contains(LOGIN_SUCCEEDED) {
            return Err(StepError::LoginRejected(registry.to_string()));
        }
        ui::step_ok(&self.ui, "Login successful");
        Ok(())
    }

    async fn provision_builder(&self) -> StepResult<Option<BuilderGuard>> {
        let Some(driver) = builder::effective_driver(&self.config.builder, &self.config.build) else {
            return Ok(None);
        };
        ui::section(&self.ui, &format!("Provisioning {} builder", driver));

        let preloaded = if self.config.builder.use_loaded_buildkit {
            builder::discover_preloaded(
                self.backend.as_ref(),
                self.docker(),
                &self.config.builder.assets_dir,
            )
            .await
        } else {
            None
        };

        let lifecycle = BuilderLifecycle::new(self.backend.clone(), self.docker(), &self.config.builder);
        let guard = lifecycle.provision(&driver, preloaded.as_deref()).await?;
        ui::step_ok(&self.ui, &format!("Builder {} ready", guard.name()));
        Ok(Some(guard))
    }

    async fn diagnose_and_build(&self, guard: Option<&BuilderGuard>) -> StepResult<()> {
        self.exec(&command::version(self.docker())).await?;
        self.exec(&command::info(self.docker())).await?;

        let pipeline = &self.config.pipeline;
        let invocation = BuildInvocation {
            docker: self.docker(),
            builder: guard.map(BuilderGuard::name),
            dry_run: pipeline.dry_run,
            metadata_file: pipeline.metadata_file.as_deref(),
            created: Utc::now(),
        };
        let cmd = command::build(&self.config.build, &invocation);

        ui::section(&self.ui, "Building image");
        if pipeline.dry_run {
            ui::remark(&self.ui, "Dry run, the image will not be pushed");
        }
        ui::trace(&self.ui, &cmd);
        match pipeline.cache_metrics_file.as_deref() {
            Some(report) => {
                run_with_metrics(self.backend.clone(), cmd, std::io::stdout(), report).await
            }
            None => run_plain(self.backend.as_ref(), &cmd, std::io::stdout()).await,
        }
    }

    async fn write_artifact(&self) {
        let pipeline = &self.config.pipeline;
        let Some(artifact_file) = pipeline.artifact_file.as_deref() else {
            return;
        };
        let Some(metadata_file) = pipeline.metadata_file.as_deref() else {
            ui::step_warn(&self.ui, "Could not fetch the digest: no metadata file configured");
            return;
        };

        let digest = match artifact::get_digest(metadata_file).await {
            Ok(digest) => digest,
            Err(e) => {
                ui::step_warn(&self.ui, &format!("Could not fetch the digest. {}", e));
                return;
            }
        };
        let pushed = PushedImage {
            registry_type: &self.config.artifact.registry_type,
            registry_url: &self.config.artifact.registry,
            repo: &self.config.build.repo,
            tags: &self.config.build.tags,
            digest: &digest,
        };
        match artifact::write_artifact_file(artifact_file, &pushed).await {
            Ok(()) => ui::step_ok(&self.ui, &format!("Image digest {}", digest)),
            Err(e) => ui::step_error_detail(
                &self.ui,
                &format!("Failed to write artifact file {}", artifact_file.display()),
                &e.to_string(),
            ),
        }
    }

    async fn cleanup(&self) -> StepResult<()> {
        if !self.config.pipeline.cleanup {
            return Ok(());
        }
        self.exec(&command::remove_image(self.docker(), &self.config.build.name))
            .await?;
        self.exec(&command::prune(self.docker())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::{Reply, ScriptedBackend};
    use crate::backend::CommandKind;
    use crate::command::PASSWORD_WARNING;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::default();
        config.daemon.disabled = true;
        config.builder.use_loaded_buildkit = false;
        config.build.repo = "octo/app".to_string();
        config.build.name = "abc123".to_string();
        config
    }

    fn pipeline(config: Config, backend: &Arc<ScriptedBackend>) -> Pipeline {
        Pipeline::new(config, backend.clone())
            .with_ui(UiContext::non_interactive())
            .with_readiness(ReadinessPolicy {
                attempts: 2,
                interval: Duration::ZERO,
            })
    }

    fn kinds(backend: &ScriptedBackend) -> Vec<CommandKind> {
        backend.calls().iter().map(|c| c.kind).collect()
    }

    #[tokio::test]
    async fn happy_path_order() {
        let backend = Arc::new(ScriptedBackend::succeeding());
        pipeline(config(), &backend).run().await.unwrap();

        assert_eq!(
            kinds(&backend),
            vec![
                CommandKind::Info,
                CommandKind::Version,
                CommandKind::Info,
                CommandKind::Build,
                CommandKind::RemoveImage,
                CommandKind::Prune,
            ]
        );
        assert_eq!(backend.lines()[4], "docker rmi abc123");
    }

    #[tokio::test]
    async fn daemon_started_when_enabled() {
        let backend = Arc::new(ScriptedBackend::succeeding());
        let mut config = config();
        config.daemon.disabled = false;
        config.pipeline.cleanup = false;
        pipeline(config, &backend).run().await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].kind, CommandKind::Daemon);
        assert_eq!(calls[0].program, "dockerd");
    }

    #[tokio::test]
    async fn unreachable_daemon_is_not_fatal() {
        // the two readiness checks fail, the later `info` diagnostic succeeds
        let info_calls = AtomicUsize::new(0);
        let backend = Arc::new(ScriptedBackend::new(move |cmd| match cmd.kind {
            CommandKind::Info if info_calls.fetch_add(1, Ordering::SeqCst) < 2 => {
                Reply::fail("Cannot connect to the Docker daemon")
            }
            _ => Reply::ok(),
        }));
        pipeline(config(), &backend).run().await.unwrap();

        let kinds = kinds(&backend);
        assert_eq!(&kinds[..3], &[CommandKind::Info, CommandKind::Info, CommandKind::Version]);
        assert!(kinds.contains(&CommandKind::Build));
    }

    #[tokio::test]
    async fn diagnostics_failure_aborts_before_build() {
        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::Version => Reply::fail("Cannot connect to the Docker daemon"),
            _ => Reply::ok(),
        }));
        let err = pipeline(config(), &backend).run().await.unwrap_err();
        assert!(matches!(err, StepError::CommandExit { code: 1, .. }));

        let kinds = kinds(&backend);
        assert!(!kinds.contains(&CommandKind::Build));
        assert!(!kinds.contains(&CommandKind::Prune));
    }

    #[tokio::test]
    async fn info_failure_aborts_and_removes_builder() {
        let info_calls = AtomicUsize::new(0);
        let backend = Arc::new(ScriptedBackend::new(move |cmd| match cmd.kind {
            CommandKind::BuilderCreate => Reply::ok_with("step-builder\n"),
            // first call is the readiness check
            CommandKind::Info if info_calls.fetch_add(1, Ordering::SeqCst) > 0 => {
                Reply::fail("permission denied")
            }
            _ => Reply::ok(),
        }));
        let mut config = config();
        config.builder.driver = Some("docker-container".to_string());

        pipeline(config, &backend).run().await.unwrap_err();

        let kinds = kinds(&backend);
        assert!(!kinds.contains(&CommandKind::Build));
        assert_eq!(kinds.last(), Some(&CommandKind::BuilderRemove));
    }

    #[tokio::test]
    async fn login_failure_is_fatal_and_scrubbed() {
        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::Login => Reply::fail(&format!("{}\nunauthorized: bad credentials", PASSWORD_WARNING)),
            _ => Reply::ok(),
        }));
        let mut config = config();
        config.login.username = Some("octo".to_string());
        config.login.password = Some("wrong".to_string());

        let err = pipeline(config, &backend).run().await.unwrap_err();
        match err {
            StepError::Auth { output, .. } => {
                assert_eq!(output, "unauthorized: bad credentials");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!kinds(&backend).contains(&CommandKind::Build));
    }

    #[tokio::test]
    async fn base_image_login_runs_first() {
        let backend = Arc::new(ScriptedBackend::succeeding());
        let mut config = config();
        config.pipeline.cleanup = false;
        config.login.username = Some("octo".to_string());
        config.login.password = Some("push-secret".to_string());
        config.base_image = Some(LoginConfig {
            registry: "mirror.example.com".to_string(),
            username: Some("puller".to_string()),
            password: Some("pull-secret".to_string()),
            ..LoginConfig::default()
        });
        pipeline(config, &backend).run().await.unwrap();

        let logins: Vec<String> = backend
            .calls()
            .iter()
            .filter(|c| c.kind == CommandKind::Login)
            .map(|c| c.args.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(logins, vec!["mirror.example.com", "https://index.docker.io/v1/"]);
    }

    #[tokio::test]
    async fn token_login_requires_success_marker() {
        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::Login => Reply::ok_with("something else happened"),
            _ => Reply::ok(),
        }));
        let mut config = config();
        config.login.registry = "us-docker.pkg.dev".to_string();
        config.login.access_token = Some("ya29.token".to_string());

        let err = pipeline(config, &backend).run().await.unwrap_err();
        assert!(matches!(err, StepError::LoginRejected(ref r) if r == "us-docker.pkg.dev"));
    }

    #[tokio::test]
    async fn token_login_uses_stdin() {
        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::Login => Reply::ok_with("Login Succeeded\n"),
            _ => Reply::ok(),
        }));
        let mut config = config();
        config.login.access_token = Some("ya29.token".to_string());
        pipeline(config, &backend).run().await.unwrap();

        let login = backend
            .calls()
            .into_iter()
            .find(|c| c.kind == CommandKind::Login)
            .unwrap();
        assert_eq!(login.stdin.as_deref(), Some("ya29.token".as_bytes()));
        assert!(!login.args.iter().any(|a| a.contains("ya29")));
    }

    #[tokio::test]
    async fn cleanup_failures_are_ignored() {
        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::RemoveImage | CommandKind::Prune => Reply::fail("no such image"),
            _ => Reply::ok(),
        }));
        pipeline(config(), &backend).run().await.unwrap();
        assert_eq!(kinds(&backend).last(), Some(&CommandKind::Prune));
    }

    #[tokio::test]
    async fn build_failure_tears_down_builder_and_skips_cleanup() {
        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::BuilderCreate => Reply::ok_with("step-builder\n"),
            CommandKind::Build => Reply::fail("ERROR: failed to solve"),
            _ => Reply::ok(),
        }));
        let mut config = config();
        config.builder.driver = Some("docker-container".to_string());

        let err = pipeline(config, &backend).run().await.unwrap_err();
        assert!(matches!(err, StepError::CommandExit { .. }));

        let kinds = kinds(&backend);
        assert_eq!(kinds.last(), Some(&CommandKind::BuilderRemove));
        assert!(!kinds.contains(&CommandKind::Prune));

        let build = backend
            .calls()
            .into_iter()
            .find(|c| c.kind == CommandKind::Build)
            .unwrap();
        assert!(build.to_string().contains("--builder step-builder"));
    }

    #[tokio::test]
    async fn provisioning_failure_stops_before_build() {
        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::BuilderCreate => Reply::ok_with("b\n"),
            CommandKind::BuilderInspect => Reply::fail("failed to bootstrap"),
            _ => Reply::ok(),
        }));
        let mut config = config();
        config.build.cache_to = vec!["type=registry,ref=octo/app:cache".to_string()];
        config.builder.driver_opts_new = vec!["image=moby/buildkit:latest".to_string()];

        let err = pipeline(config, &backend).run().await.unwrap_err();
        assert!(err.is_provisioning());

        let kinds = kinds(&backend);
        assert!(!kinds.contains(&CommandKind::Build));
        assert!(!kinds.contains(&CommandKind::Version));
        assert_eq!(
            kinds.iter().filter(|k| **k == CommandKind::BuilderCreate).count(),
            2
        );
    }

    #[tokio::test]
    async fn artifact_and_metrics_files() {
        let temp = TempDir::new().unwrap();
        let metadata = temp.path().join("metadata.json");
        std::fs::write(&metadata, r#"{"containerimage.digest":"sha256:feed"}"#).unwrap();

        let backend = Arc::new(ScriptedBackend::new(|cmd| match cmd.kind {
            CommandKind::Build => Reply::ok_with("#1 DONE 0.2s\n#2 CACHED\n#3 CACHED\n"),
            _ => Reply::ok(),
        }));
        let mut config = config();
        config.pipeline.metadata_file = Some(metadata.clone());
        config.pipeline.artifact_file = Some(temp.path().join("artifact.json"));
        config.pipeline.cache_metrics_file = Some(temp.path().join("cache.json"));
        pipeline(config, &backend).run().await.unwrap();

        let artifact: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(temp.path().join("artifact.json")).unwrap())
                .unwrap();
        assert_eq!(artifact["data"]["images"][0]["image"], "octo/app:latest");
        assert_eq!(artifact["data"]["images"][0]["digest"], "sha256:feed");

        let metrics: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(temp.path().join("cache.json")).unwrap())
                .unwrap();
        assert_eq!(metrics["cached"], 2);
        assert_eq!(metrics["total_layers"], 3);

        let build = backend
            .calls()
            .into_iter()
            .find(|c| c.kind == CommandKind::Build)
            .unwrap();
        assert!(build.args.contains(&metadata.display().to_string()));
    }

    #[tokio::test]
    async fn missing_digest_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::succeeding());
        let mut config = config();
        config.pipeline.metadata_file = Some(temp.path().join("never-written.json"));
        config.pipeline.artifact_file = Some(temp.path().join("artifact.json"));
        pipeline(config, &backend).run().await.unwrap();

        assert!(!temp.path().join("artifact.json").exists());
    }

    #[tokio::test]
    async fn auth_file_written_to_docker_home() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::succeeding());
        let mut config = config();
        config.pipeline.docker_home = Some(temp.path().join(".docker"));
        config.login.config = Some(r#"{"auths":{}}"#.to_string());
        pipeline(config, &backend).run().await.unwrap();

        assert!(temp.path().join(".docker").join("config.json").exists());
        // no password, so no login command
        assert!(!kinds(&backend).contains(&CommandKind::Login));
    }
}
