//! CLI argument definitions using clap derive
//!
//! Every option can also come from the environment the CI system prepares
//! for the step. Values given here override the configuration file.

use crate::command::has_build_arg;
use crate::config::{Config, LoginConfig, ProxySettings};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

/// Build and publish a container image with docker buildx
#[derive(Parser, Debug)]
#[command(name = "buildx-step")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "BUILDX_STEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "PLUGIN_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub login: LoginArgs,

    #[command(flatten)]
    pub build: BuildArgs,

    #[command(flatten)]
    pub builder: BuilderArgs,

    #[command(flatten)]
    pub daemon: DaemonArgs,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Pipeline")]
pub struct PipelineArgs {
    /// Build without pushing
    #[arg(long, env = "PLUGIN_DRY_RUN")]
    pub dry_run: bool,

    /// Remove the image and prune after the build
    #[arg(long, env = "PLUGIN_PURGE", value_parser = BoolishValueParser::new())]
    pub purge: Option<bool>,

    /// Buildx metadata file
    #[arg(long, env = "PLUGIN_METADATA_FILE")]
    pub metadata_file: Option<PathBuf>,

    /// Artifact file written after a push
    #[arg(long, env = "PLUGIN_ARTIFACT_FILE")]
    pub artifact_file: Option<PathBuf>,

    /// Cache metrics report
    #[arg(long, env = "PLUGIN_CACHE_METRICS_FILE")]
    pub cache_metrics_file: Option<PathBuf>,

    /// Docker client config directory
    #[arg(long, env = "DOCKER_CONFIG")]
    pub docker_home: Option<PathBuf>,

    /// Registry flavor recorded in the artifact file
    #[arg(long, env = "PLUGIN_REGISTRY_TYPE")]
    pub registry_type: Option<String>,

    /// Registry URL recorded in the artifact file
    #[arg(long, env = "PLUGIN_ARTIFACT_REGISTRY")]
    pub artifact_registry: Option<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Registry")]
pub struct LoginArgs {
    #[arg(long, env = "PLUGIN_REGISTRY")]
    pub registry: Option<String>,

    #[arg(long, env = "PLUGIN_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "PLUGIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "PLUGIN_EMAIL")]
    pub email: Option<String>,

    /// Docker config.json content
    #[arg(long = "docker-config", env = "PLUGIN_CONFIG", hide_env_values = true)]
    pub docker_config: Option<String>,

    /// OAuth2 access token
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Registry of the base image
    #[arg(long, env = "PLUGIN_BASE_IMAGE_REGISTRY")]
    pub base_image_registry: Option<String>,

    #[arg(long, env = "PLUGIN_BASE_IMAGE_USERNAME")]
    pub base_image_username: Option<String>,

    #[arg(long, env = "PLUGIN_BASE_IMAGE_PASSWORD", hide_env_values = true)]
    pub base_image_password: Option<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Build")]
pub struct BuildArgs {
    /// Target repository
    #[arg(long, env = "PLUGIN_REPO")]
    pub repo: Option<String>,

    #[arg(long, env = "PLUGIN_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    #[arg(long, env = "PLUGIN_DOCKERFILE")]
    pub dockerfile: Option<String>,

    #[arg(long, env = "PLUGIN_CONTEXT")]
    pub context: Option<String>,

    /// Commit SHA
    #[arg(long = "commit-sha", env = "DRONE_COMMIT_SHA")]
    pub name: Option<String>,

    #[arg(long, env = "DRONE_REMOTE_URL")]
    pub remote: Option<String>,

    #[arg(long, env = "DRONE_REPO_LINK")]
    pub link: Option<String>,

    #[arg(long, env = "PLUGIN_BUILD_ARGS", value_delimiter = ',')]
    pub build_args: Vec<String>,

    /// Build args whose values may contain commas
    #[arg(long, env = "PLUGIN_BUILD_ARGS_NEW", value_delimiter = ';')]
    pub build_args_new: Vec<String>,

    /// Use --build-args-new instead of --build-args
    #[arg(long, env = "PLUGIN_MULTIPLE_BUILD_ARGS")]
    pub multiple_build_args: bool,

    /// Environment variables forwarded as build args
    #[arg(long, env = "PLUGIN_ARGS_FROM_ENV", value_delimiter = ',')]
    pub args_from_env: Vec<String>,

    #[arg(long, env = "PLUGIN_TARGET")]
    pub target: Option<String>,

    #[arg(long, env = "PLUGIN_PLATFORM")]
    pub platform: Option<String>,

    #[arg(long, env = "PLUGIN_SQUASH")]
    pub squash: bool,

    #[arg(long, env = "PLUGIN_PULL_IMAGE", value_parser = BoolishValueParser::new())]
    pub pull_image: Option<bool>,

    #[arg(long, env = "PLUGIN_COMPRESS")]
    pub compress: bool,

    #[arg(long, env = "PLUGIN_NO_CACHE")]
    pub no_cache: bool,

    #[arg(long, env = "PLUGIN_QUIET")]
    pub quiet: bool,

    #[arg(long, env = "PLUGIN_CACHE_FROM", value_delimiter = ';')]
    pub cache_from: Vec<String>,

    #[arg(long, env = "PLUGIN_CACHE_TO", value_delimiter = ';')]
    pub cache_to: Vec<String>,

    /// Force path-style addressing for s3 caches
    #[arg(long, env = "PLUGIN_S3_PATH_STYLE")]
    pub s3_path_style: bool,

    #[arg(long, env = "PLUGIN_CACHE_S3_ACCESS_KEY", hide_env_values = true)]
    pub s3_access_key: Option<String>,

    #[arg(long, env = "PLUGIN_CACHE_S3_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,

    #[arg(long, env = "PLUGIN_CACHE_GCP_JSON_KEY", hide_env_values = true)]
    pub gcp_json_key: Option<String>,

    #[arg(long, env = "PLUGIN_ADD_HOST", value_delimiter = ',')]
    pub add_host: Vec<String>,

    /// Inline secret, passed through as-is
    #[arg(long, env = "PLUGIN_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Secrets as id=ENV_NAME
    #[arg(long, env = "PLUGIN_SECRETS_FROM_ENV", value_delimiter = ',')]
    pub secrets_from_env: Vec<String>,

    /// Secrets as id=/path
    #[arg(long, env = "PLUGIN_SECRETS_FROM_FILE", value_delimiter = ',')]
    pub secrets_from_file: Vec<String>,

    #[arg(long, env = "PLUGIN_SSH_AGENT_KEY")]
    pub ssh: Option<String>,

    #[arg(long, env = "PLUGIN_AUTO_LABEL", value_parser = BoolishValueParser::new())]
    pub auto_label: Option<bool>,

    #[arg(long, env = "PLUGIN_LABEL_SCHEMA", value_delimiter = ',')]
    pub label_schema: Vec<String>,

    #[arg(long = "label", env = "PLUGIN_CUSTOM_LABELS", value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Load the image locally on dry runs
    #[arg(long, env = "PLUGIN_BUILDX_LOAD")]
    pub load: bool,

    /// Raw buildx options, semicolon separated
    #[arg(long, env = "PLUGIN_BUILDX_OPTIONS")]
    pub buildx_options: Option<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Builder")]
pub struct BuilderArgs {
    #[arg(long, env = "PLUGIN_BUILDER_NAME")]
    pub builder_name: Option<String>,

    #[arg(long, env = "PLUGIN_BUILDER_DRIVER")]
    pub builder_driver: Option<String>,

    #[arg(long, env = "PLUGIN_BUILDER_DRIVER_OPTS", value_delimiter = ',')]
    pub builder_driver_opts: Vec<String>,

    /// Driver options in the newer format
    #[arg(long, env = "PLUGIN_BUILDER_DRIVER_OPTS_NEW", value_delimiter = ';')]
    pub builder_driver_opts_new: Vec<String>,

    #[arg(long, env = "PLUGIN_BUILDER_REMOTE_CONN")]
    pub builder_remote_conn: Option<String>,

    #[arg(long, env = "PLUGIN_BUILDER_DAEMON_CONFIG")]
    pub builder_daemon_config: Option<String>,

    /// Use the buildkit image shipped with the step
    #[arg(long, env = "PLUGIN_BUILDKIT_USE_LOADED", value_parser = BoolishValueParser::new())]
    pub use_loaded_buildkit: Option<bool>,

    #[arg(long, env = "PLUGIN_BUILDKIT_ASSETS_DIR")]
    pub buildkit_assets_dir: Option<PathBuf>,

    #[arg(long, env = "PLUGIN_BUILDKIT_VERSION")]
    pub buildkit_version: Option<String>,

    #[arg(long, env = "HARNESS_HTTP_PROXY")]
    pub builder_http_proxy: Option<String>,

    #[arg(long, env = "HARNESS_HTTPS_PROXY")]
    pub builder_https_proxy: Option<String>,

    #[arg(long, env = "PLUGIN_TLS_HANDSHAKE_TIMEOUT")]
    pub tls_handshake_timeout: Option<String>,

    #[arg(long, env = "PLUGIN_RESPONSE_HEADER_TIMEOUT")]
    pub response_header_timeout: Option<String>,
}

#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Daemon")]
pub struct DaemonArgs {
    /// Do not start a docker daemon
    #[arg(long, env = "PLUGIN_DAEMON_OFF")]
    pub daemon_off: bool,

    #[arg(long, env = "PLUGIN_STORAGE_DRIVER")]
    pub storage_driver: Option<String>,

    #[arg(long, env = "PLUGIN_STORAGE_PATH")]
    pub storage_path: Option<String>,

    #[arg(long, env = "PLUGIN_INSECURE")]
    pub insecure: bool,

    #[arg(long, env = "PLUGIN_MIRROR")]
    pub mirror: Option<String>,

    #[arg(long, env = "PLUGIN_BIP")]
    pub bip: Option<String>,

    #[arg(long = "dns", env = "PLUGIN_CUSTOM_DNS", value_delimiter = ',')]
    pub dns: Vec<String>,

    #[arg(long = "dns-search", env = "PLUGIN_CUSTOM_DNS_SEARCH", value_delimiter = ',')]
    pub dns_search: Vec<String>,

    #[arg(long, env = "PLUGIN_MTU")]
    pub mtu: Option<String>,

    #[arg(long, env = "PLUGIN_IPV6")]
    pub ipv6: bool,

    #[arg(long = "daemon-debug", env = "PLUGIN_DEBUG")]
    pub debug: bool,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

fn set_list(target: &mut Vec<String>, values: Vec<String>) {
    let values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    if !values.is_empty() {
        *target = values;
    }
}

/// Append `NAME=value` for each named variable that is set, non-empty and
/// not already present in `args`
fn append_env_args(args: &mut Vec<String>, names: &[String]) {
    for name in names {
        let Some(value) = std::env::var(name).ok().filter(|v| !v.is_empty()) else {
            debug!("Build arg {} not set in environment", name);
            continue;
        };
        if !has_build_arg(args, name) {
            args.push(format!("{}={}", name, value));
        }
    }
}

impl Cli {
    /// Overlay the supplied options on `config` and capture the values the
    /// pipeline reads from the environment
    pub fn apply(self, config: &mut Config) {
        self.pipeline.apply(config);
        self.login.apply(config);
        self.build.apply(config);
        self.builder.apply(config);
        self.daemon.apply(config);
        if let Some(format) = self.log_format {
            config.general.log_format = format.as_str().to_string();
        }
        if self.verbose > 0 {
            config.general.verbose = true;
        }
    }
}

impl PipelineArgs {
    fn apply(self, config: &mut Config) {
        let pipeline = &mut config.pipeline;
        pipeline.dry_run |= self.dry_run;
        set(&mut pipeline.cleanup, self.purge);
        set_opt(&mut pipeline.metadata_file, self.metadata_file);
        set_opt(&mut pipeline.artifact_file, self.artifact_file);
        set_opt(&mut pipeline.cache_metrics_file, self.cache_metrics_file);
        set_opt(&mut pipeline.docker_home, self.docker_home);
        set(&mut config.artifact.registry_type, self.registry_type);
        set(&mut config.artifact.registry, self.artifact_registry);
    }
}

impl LoginArgs {
    fn apply(self, config: &mut Config) {
        let login = &mut config.login;
        set(&mut login.registry, self.registry.filter(|r| !r.is_empty()));
        set_opt(&mut login.username, self.username);
        set_opt(&mut login.password, self.password);
        set_opt(&mut login.email, self.email);
        set_opt(&mut login.config, self.docker_config);
        set_opt(&mut login.access_token, self.access_token);

        if let Some(registry) = self.base_image_registry.filter(|r| !r.is_empty()) {
            let base = config.base_image.get_or_insert_with(LoginConfig::default);
            base.registry = registry;
        }
        if let Some(base) = config.base_image.as_mut() {
            set_opt(&mut base.username, self.base_image_username);
            set_opt(&mut base.password, self.base_image_password);
        }
    }
}

impl BuildArgs {
    fn apply(self, config: &mut Config) {
        let build = &mut config.build;
        set(&mut build.repo, self.repo);
        set_list(&mut build.tags, self.tags);
        set(&mut build.dockerfile, self.dockerfile);
        set(&mut build.context, self.context);
        set(&mut build.name, self.name.filter(|n| !n.is_empty()));
        set_opt(&mut build.remote, self.remote);
        set_opt(&mut build.link, self.link);
        set_list(&mut build.args, self.build_args);
        set_list(&mut build.args_new, self.build_args_new);
        build.multiple_build_args |= self.multiple_build_args;
        set_opt(&mut build.target, self.target);
        set_opt(&mut build.platform, self.platform);
        build.squash |= self.squash;
        set(&mut build.pull, self.pull_image);
        build.compress |= self.compress;
        build.no_cache |= self.no_cache;
        build.quiet |= self.quiet;
        set_list(&mut build.cache_from, self.cache_from);
        set_list(&mut build.cache_to, self.cache_to);
        build.s3_path_style |= self.s3_path_style;
        set_opt(&mut build.cache_credentials.s3_access_key, self.s3_access_key);
        set_opt(&mut build.cache_credentials.s3_secret_key, self.s3_secret_key);
        set_opt(&mut build.cache_credentials.gcp_json_key, self.gcp_json_key);
        set_list(&mut build.add_host, self.add_host);
        set_opt(&mut build.secret, self.secret);
        set_list(&mut build.secrets_from_env, self.secrets_from_env);
        set_list(&mut build.secrets_from_file, self.secrets_from_file);
        set_opt(&mut build.ssh, self.ssh);
        set(&mut build.auto_label, self.auto_label);
        set_list(&mut build.label_schema, self.label_schema);
        set_list(&mut build.labels, self.labels);
        build.load_on_dry_run |= self.load;
        set_opt(&mut build.extra_options, self.buildx_options);

        append_env_args(&mut build.args, &self.args_from_env);
        append_env_args(&mut build.args_new, &self.args_from_env);
        build.proxy = ProxySettings::from_env();
    }
}

impl BuilderArgs {
    fn apply(self, config: &mut Config) {
        let builder = &mut config.builder;
        set_opt(&mut builder.name, self.builder_name);
        set_opt(&mut builder.driver, self.builder_driver);
        set_list(&mut builder.driver_opts, self.builder_driver_opts);
        set_list(&mut builder.driver_opts_new, self.builder_driver_opts_new);
        set_opt(&mut builder.remote_conn, self.builder_remote_conn);
        set_opt(&mut builder.daemon_config, self.builder_daemon_config);
        set(&mut builder.use_loaded_buildkit, self.use_loaded_buildkit);
        set(&mut builder.assets_dir, self.buildkit_assets_dir);
        set_opt(&mut builder.buildkit_version, self.buildkit_version);
        set_opt(&mut builder.http_proxy, self.builder_http_proxy);
        set_opt(&mut builder.https_proxy, self.builder_https_proxy);
        set_opt(&mut builder.tls_handshake_timeout, self.tls_handshake_timeout);
        set_opt(&mut builder.response_header_timeout, self.response_header_timeout);
    }
}

impl DaemonArgs {
    fn apply(self, config: &mut Config) {
        let daemon = &mut config.daemon;
        daemon.disabled |= self.daemon_off;
        set_opt(&mut daemon.storage_driver, self.storage_driver);
        set(&mut daemon.storage_path, self.storage_path);
        daemon.insecure |= self.insecure;
        set_opt(&mut daemon.mirror, self.mirror);
        set_opt(&mut daemon.bip, self.bip);
        set_list(&mut daemon.dns, self.dns);
        set_list(&mut daemon.dns_search, self.dns_search);
        set_opt(&mut daemon.mtu, self.mtu);
        daemon.ipv6 |= self.ipv6;
        daemon.debug |= self.debug;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const STEP_VARS: [&str; 10] = [
        "PLUGIN_REPO",
        "PLUGIN_TAGS",
        "PLUGIN_CACHE_FROM",
        "PLUGIN_BUILDER_DRIVER_OPTS_NEW",
        "PLUGIN_PURGE",
        "PLUGIN_ARGS_FROM_ENV",
        "PLUGIN_PASSWORD",
        "STEP_TEST_VERSION",
        "STEP_TEST_EMPTY",
        "http_proxy",
    ];

    fn clear_env() {
        for key in STEP_VARS {
            std::env::remove_var(key);
        }
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["buildx-step"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    #[serial]
    fn env_lists_use_their_delimiters() {
        clear_env();
        std::env::set_var("PLUGIN_TAGS", "1.0,latest");
        std::env::set_var(
            "PLUGIN_CACHE_FROM",
            "type=registry,ref=octo/app:cache;type=local,src=/tmp/cache",
        );
        std::env::set_var(
            "PLUGIN_BUILDER_DRIVER_OPTS_NEW",
            "image=moby/buildkit:v0.13.2,network=host",
        );

        let mut config = Config::default();
        parse(&[]).apply(&mut config);
        clear_env();

        assert_eq!(config.build.tags, vec!["1.0", "latest"]);
        assert_eq!(
            config.build.cache_from,
            vec!["type=registry,ref=octo/app:cache", "type=local,src=/tmp/cache"]
        );
        assert_eq!(
            config.builder.driver_opts_new,
            vec!["image=moby/buildkit:v0.13.2,network=host"]
        );
    }

    #[test]
    #[serial]
    fn unset_options_keep_file_values() {
        clear_env();
        let mut config = Config::default();
        config.build.repo = "octo/from-file".to_string();
        config.build.tags = vec!["stable".to_string()];

        parse(&[]).apply(&mut config);

        assert_eq!(config.build.repo, "octo/from-file");
        assert_eq!(config.build.tags, vec!["stable"]);
        assert!(config.pipeline.cleanup);
    }

    #[test]
    #[serial]
    fn flags_override_file_values() {
        clear_env();
        let mut config = Config::default();
        config.build.repo = "octo/from-file".to_string();

        parse(&["--repo", "octo/app", "--purge", "false", "--dry-run", "-vv"]).apply(&mut config);

        assert_eq!(config.build.repo, "octo/app");
        assert!(!config.pipeline.cleanup);
        assert!(config.pipeline.dry_run);
        assert!(config.general.verbose);
    }

    #[test]
    #[serial]
    fn boolish_env_values() {
        clear_env();
        std::env::set_var("PLUGIN_PURGE", "off");
        let mut config = Config::default();
        parse(&[]).apply(&mut config);
        clear_env();
        assert!(!config.pipeline.cleanup);
    }

    #[test]
    #[serial]
    fn args_from_env_resolved() {
        clear_env();
        std::env::set_var("STEP_TEST_VERSION", "1.2.3");
        let mut config = Config::default();
        config.build.args = vec!["STEP_TEST_VERSION=pinned".to_string()];

        parse(&["--args-from-env", "STEP_TEST_VERSION,STEP_TEST_MISSING"]).apply(&mut config);
        clear_env();

        assert_eq!(config.build.args, vec!["STEP_TEST_VERSION=pinned"]);
        assert_eq!(config.build.args_new, vec!["STEP_TEST_VERSION=1.2.3"]);
    }

    #[test]
    #[serial]
    fn empty_env_args_are_skipped() {
        clear_env();
        std::env::set_var("STEP_TEST_EMPTY", "");
        let mut config = Config::default();

        parse(&["--args-from-env", "STEP_TEST_EMPTY"]).apply(&mut config);
        clear_env();

        assert!(config.build.args.is_empty());
        assert!(config.build.args_new.is_empty());
    }

    #[test]
    #[serial]
    fn proxy_captured_from_environment() {
        clear_env();
        std::env::set_var("http_proxy", "http://proxy:3128");
        let mut config = Config::default();
        parse(&[]).apply(&mut config);
        clear_env();
        assert_eq!(config.build.proxy.get("http_proxy"), Some("http://proxy:3128"));
    }

    #[test]
    #[serial]
    fn base_image_login_from_flags() {
        clear_env();
        let mut config = Config::default();
        parse(&[
            "--base-image-registry",
            "mirror.example.com",
            "--base-image-username",
            "puller",
        ])
        .apply(&mut config);

        let base = config.base_image.unwrap();
        assert_eq!(base.registry, "mirror.example.com");
        assert_eq!(base.username.as_deref(), Some("puller"));
    }
}
