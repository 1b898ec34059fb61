//! `docker buildx build` argument synthesis

use super::cache::{apply_path_style, sanitize_descriptor};
use super::proxy::add_proxy_build_args;
use crate::backend::{BackendCommand, CommandKind};
use crate::config::BuildConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use tracing::debug;

/// Namespace for automatic OCI labels
pub const LABEL_PREFIX: &str = "org.opencontainers.image";

/// Per-run inputs to the build command that are not part of `BuildConfig`
#[derive(Debug, Clone)]
pub struct BuildInvocation<'a> {
    /// Docker CLI executable
    pub docker: &'a str,
    /// Ephemeral builder to target, if one was provisioned
    pub builder: Option<&'a str>,
    pub dry_run: bool,
    pub metadata_file: Option<&'a Path>,
    /// Timestamp for the `created` label
    pub created: DateTime<Utc>,
}

/// Encode a `key=value` secret spec as a buildx `--secret` value.
///
/// Returns `None` when there is no `=` or either side is empty.
pub fn secret_arg(kvp: &str, file: bool) -> Option<String> {
    let (key, value) = kvp.split_once('=')?;
    if key.is_empty() || value.is_empty() {
        return None;
    }
    let source = if file { "src" } else { "env" };
    Some(format!("id={},{}={}", key, source, value))
}

fn prepare_cache(list: &[String], build: &BuildConfig) -> Vec<String> {
    list.iter()
        .map(|descriptor| {
            let sanitized = sanitize_descriptor(descriptor, &build.cache_credentials);
            if build.s3_path_style {
                apply_path_style(&sanitized)
            } else {
                sanitized
            }
        })
        .collect()
}

fn extra_options(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(';')
        .flat_map(str::split_whitespace)
        .map(String::from)
        .collect()
}

/// Synthesize the full build invocation
pub fn build(build: &BuildConfig, run: &BuildInvocation<'_>) -> BackendCommand {
    let mut cmd = BackendCommand::new(run.docker, CommandKind::Build).args([
        "buildx",
        "build",
        "--rm=true",
        "-f",
        build.dockerfile.as_str(),
    ]);

    if let Some(builder) = run.builder.filter(|b| !b.is_empty()) {
        cmd = cmd.args(["--builder", builder]);
    }
    for tag in &build.tags {
        cmd = cmd.arg("-t").arg(format!("{}:{}", build.repo, tag));
    }
    if !run.dry_run {
        cmd = cmd.arg("--push");
    } else if build.load_on_dry_run {
        cmd = cmd.arg("--load");
    }
    cmd = cmd.args(extra_options(build.extra_options.as_deref()));
    cmd = cmd.arg(&build.context);

    if let Some(path) = run.metadata_file {
        cmd = cmd.arg("--metadata-file").arg(path.display().to_string());
    }
    if build.squash {
        cmd = cmd.arg("--squash");
    }
    if build.compress {
        cmd = cmd.arg("--compress");
    }
    if build.pull {
        cmd = cmd.arg("--pull=true");
    }
    if build.no_cache {
        cmd = cmd.arg("--no-cache");
    }
    for descriptor in prepare_cache(&build.cache_from, build) {
        cmd = cmd.arg("--cache-from").arg(descriptor);
    }
    for descriptor in prepare_cache(&build.cache_to, build) {
        cmd = cmd.arg("--cache-to").arg(descriptor);
    }

    let mut args = build.args.clone();
    let mut args_new = build.args_new.clone();
    add_proxy_build_args(&mut args, &mut args_new, &build.proxy);
    let build_args = if build.multiple_build_args { args_new } else { args };
    for arg in build_args {
        cmd = cmd.arg("--build-arg").arg(arg);
    }

    for host in &build.add_host {
        cmd = cmd.args(["--add-host", host.as_str()]);
    }
    if let Some(secret) = build.secret.as_deref().filter(|s| !s.is_empty()) {
        cmd = cmd.args(["--secret", secret]);
    }
    for (specs, file) in [(&build.secrets_from_env, false), (&build.secrets_from_file, true)] {
        for spec in specs {
            match secret_arg(spec, file) {
                Some(arg) => cmd = cmd.arg("--secret").arg(arg),
                None => debug!("Skipping malformed secret spec"),
            }
        }
    }
    if let Some(target) = build.target.as_deref().filter(|t| !t.is_empty()) {
        cmd = cmd.args(["--target", target]);
    }
    if build.quiet {
        cmd = cmd.arg("--quiet");
    }
    if let Some(platform) = build.platform.as_deref().filter(|p| !p.is_empty()) {
        cmd = cmd.args(["--platform", platform]);
    }
    if let Some(ssh) = build.ssh.as_deref().filter(|s| !s.is_empty()) {
        cmd = cmd.args(["--ssh", ssh]);
    }

    if build.auto_label {
        let created = run.created.to_rfc3339_opts(SecondsFormat::Secs, true);
        let schema = [
            format!("created={}", created),
            format!("revision={}", build.name),
            format!("source={}", build.remote.as_deref().unwrap_or_default()),
            format!("url={}", build.link.as_deref().unwrap_or_default()),
        ];
        for label in schema.iter().chain(&build.label_schema) {
            cmd = cmd.arg("--label").arg(format!("{}.{}", LABEL_PREFIX, label));
        }
    }
    for label in &build.labels {
        cmd = cmd.args(["--label", label.as_str()]);
    }

    cmd
}
