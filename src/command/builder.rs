//! Buildx builder commands

use crate::backend::{BackendCommand, CommandKind};
use crate::config::BuilderConfig;

/// Driver of the daemon's built-in builder
pub const DEFAULT_DRIVER: &str = "docker";

/// Driver running buildkitd in its own container
pub const DOCKER_CONTAINER_DRIVER: &str = "docker-container";

/// Driver connecting to an existing buildkitd endpoint
pub const REMOTE_DRIVER: &str = "remote";

/// `docker buildx create --use ...` for the given driver options
pub fn builder_create(
    docker: &str,
    builder: &BuilderConfig,
    driver: &str,
    driver_opts: &[String],
) -> BackendCommand {
    let mut cmd = BackendCommand::new(docker, CommandKind::BuilderCreate)
        .args(["buildx", "create", "--use", "--driver", driver]);

    if let Some(name) = builder.name.as_deref().filter(|n| !n.is_empty()) {
        cmd = cmd.args(["--name", name]);
    }
    if let Some(config) = builder.daemon_config.as_deref().filter(|c| !c.is_empty()) {
        cmd = cmd.args(["--buildkitd-config", config]);
    }
    for opt in driver_opts {
        cmd = cmd.args(["--driver-opt", opt.as_str()]);
    }

    if let Some(http) = builder.http_proxy.as_deref().filter(|p| !p.is_empty()) {
        cmd = cmd.arg("--driver-opt").arg(format!("env.http_proxy={}", http));
        if let Some(https) = builder.https_proxy.as_deref().filter(|p| !p.is_empty()) {
            cmd = cmd.arg("--driver-opt").arg(format!("env.https_proxy={}", https));
        }
        cmd = cmd.args(["--driver-opt", "network=host"]);
    }

    if driver == REMOTE_DRIVER {
        if let Some(conn) = builder.remote_conn.as_deref().filter(|c| !c.is_empty()) {
            cmd = cmd.arg(conn);
        }
    }

    let mut flags = Vec::new();
    if let Some(timeout) = builder.tls_handshake_timeout.as_deref().filter(|t| !t.is_empty()) {
        flags.push(format!("--tls-handshake-timeout={}", timeout));
    }
    if let Some(timeout) = builder.response_header_timeout.as_deref().filter(|t| !t.is_empty()) {
        flags.push(format!("--response-header-timeout={}", timeout));
    }
    if !flags.is_empty() {
        cmd = cmd.arg("--buildkitd-flags").arg(flags.join(" "));
    }

    cmd
}

/// `docker buildx inspect --bootstrap --builder <name>`
pub fn builder_inspect(docker: &str, name: &str) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::BuilderInspect)
        .args(["buildx", "inspect", "--bootstrap", "--builder", name])
}

/// `docker buildx rm <name>`
pub fn builder_remove(docker: &str, name: &str) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::BuilderRemove).args(["buildx", "rm", name])
}

/// Pin every `image=` driver option to `version`
pub fn update_image_version(driver_opts: &mut [String], version: &str) {
    for opt in driver_opts.iter_mut().filter(|o| o.starts_with("image=")) {
        *opt = format!("image={}", version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_create() {
        let cmd = builder_create("docker", &BuilderConfig::default(), DOCKER_CONTAINER_DRIVER, &[]);
        assert_eq!(
            cmd.args,
            vec!["buildx", "create", "--use", "--driver", "docker-container"]
        );
        assert_eq!(cmd.kind, CommandKind::BuilderCreate);
    }

    #[test]
    fn full_create() {
        let builder = BuilderConfig {
            name: Some("ci-builder".to_string()),
            daemon_config: Some("/etc/buildkitd.toml".to_string()),
            http_proxy: Some("http://proxy:3128".to_string()),
            https_proxy: Some("http://proxy:3129".to_string()),
            remote_conn: Some("tcp://buildkitd:1234".to_string()),
            tls_handshake_timeout: Some("30s".to_string()),
            response_header_timeout: Some("60s".to_string()),
            ..BuilderConfig::default()
        };
        let opts = vec!["image=moby/buildkit:v0.12.0".to_string()];
        let cmd = builder_create("docker", &builder, REMOTE_DRIVER, &opts);
        assert_eq!(
            cmd.args,
            vec![
                "buildx",
                "create",
                "--use",
                "--driver",
                "remote",
                "--name",
                "ci-builder",
                "--buildkitd-config",
                "/etc/buildkitd.toml",
                "--driver-opt",
                "image=moby/buildkit:v0.12.0",
                "--driver-opt",
                "env.http_proxy=http://proxy:3128",
                "--driver-opt",
                "env.https_proxy=http://proxy:3129",
                "--driver-opt",
                "network=host",
                "tcp://buildkitd:1234",
                "--buildkitd-flags",
                "--tls-handshake-timeout=30s --response-header-timeout=60s",
            ]
        );
    }

    #[test]
    fn remote_conn_needs_remote_driver() {
        let builder = BuilderConfig {
            remote_conn: Some("tcp://buildkitd:1234".to_string()),
            ..BuilderConfig::default()
        };
        let cmd = builder_create("docker", &builder, DOCKER_CONTAINER_DRIVER, &[]);
        assert!(!cmd.args.contains(&"tcp://buildkitd:1234".to_string()));
    }

    #[test]
    fn https_proxy_alone_is_ignored() {
        let builder = BuilderConfig {
            https_proxy: Some("http://proxy:3129".to_string()),
            ..BuilderConfig::default()
        };
        let cmd = builder_create("docker", &builder, DOCKER_CONTAINER_DRIVER, &[]);
        assert!(!cmd.args.iter().any(|a| a.starts_with("env.")));
    }

    #[test]
    fn inspect_and_remove() {
        assert_eq!(
            builder_inspect("docker", "b1").to_string(),
            "docker buildx inspect --bootstrap --builder b1"
        );
        assert_eq!(builder_remove("docker", "b1").to_string(), "docker buildx rm b1");
    }

    #[test]
    fn pins_image_option() {
        let mut opts = vec![
            "image=moby/buildkit:latest".to_string(),
            "network=host".to_string(),
        ];
        update_image_version(&mut opts, "moby/buildkit:v0.13.2");
        assert_eq!(opts, vec!["image=moby/buildkit:v0.13.2", "network=host"]);
    }
}
