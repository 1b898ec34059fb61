//! Configuration schema for buildx-step
//!
//! Every section tolerates being partially specified; missing keys fall back
//! to the defaults the CI system would otherwise supply.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Docker Hub, used whenever no registry is given
pub const DEFAULT_REGISTRY: &str = "https://index.docker.io/v1/";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Pipeline behavior and output locations
    pub pipeline: PipelineConfig,

    /// Push registry credentials
    pub login: LoginConfig,

    /// Optional base image (pull) registry credentials
    pub base_image: Option<LoginConfig>,

    /// Image build options
    pub build: BuildConfig,

    /// Ephemeral buildx builder options
    pub builder: BuilderConfig,

    /// Embedded docker daemon options
    pub daemon: DaemonConfig,

    /// Artifact file metadata
    pub artifact: ArtifactConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Pipeline-wide switches and output files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Skip pushing the image
    pub dry_run: bool,

    /// Remove the built image and prune afterwards
    pub cleanup: bool,

    /// Where buildx writes its metadata document
    pub metadata_file: Option<PathBuf>,

    /// Where the artifact description is written
    pub artifact_file: Option<PathBuf>,

    /// Where the cache metrics report is written
    pub cache_metrics_file: Option<PathBuf>,

    /// Docker CLI executable
    pub docker_exe: String,

    /// Docker client config directory (defaults to ~/.docker)
    pub docker_home: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            cleanup: true,
            metadata_file: None,
            artifact_file: None,
            cache_metrics_file: None,
            docker_exe: "docker".to_string(),
            docker_home: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve the docker client config directory
    pub fn docker_home(&self) -> PathBuf {
        self.docker_home.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".docker")
        })
    }
}

/// Registry login settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Registry address
    pub registry: String,

    /// Registry username
    pub username: Option<String>,

    /// Registry password
    pub password: Option<String>,

    /// Registry email (selects the legacy login shape)
    pub email: Option<String>,

    /// Whole docker config.json content
    pub config: Option<String>,

    /// Bearer access token, passed over stdin
    pub access_token: Option<String>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            username: None,
            password: None,
            email: None,
            config: None,
            access_token: None,
        }
    }
}

impl LoginConfig {
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_config(&self) -> bool {
        self.config.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Live cloud credentials substituted into cache descriptors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCredentials {
    /// S3 access key id
    pub s3_access_key: Option<String>,

    /// S3 secret access key
    pub s3_secret_key: Option<String>,

    /// GCS service account JSON key
    pub gcp_json_key: Option<String>,
}

/// Proxy values captured from the environment at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    /// Proxy keys forwarded as build args, lower-case form
    pub const KEYS: [&'static str; 3] = ["http_proxy", "https_proxy", "no_proxy"];

    /// Read proxy values, preferring the lower-case variable
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| std::env::var(key.to_uppercase()).ok())
                .filter(|v| !v.is_empty())
        };
        Self {
            http_proxy: read("http_proxy"),
            https_proxy: read("https_proxy"),
            no_proxy: read("no_proxy"),
        }
    }

    /// Look up a value by its lower-case key
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "http_proxy" => self.http_proxy.as_deref(),
            "https_proxy" => self.https_proxy.as_deref(),
            "no_proxy" => self.no_proxy.as_deref(),
            _ => None,
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Image build options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Git remote URL
    pub remote: Option<String>,

    /// Commit SHA, used as revision label and cleanup target
    pub name: String,

    /// Dockerfile path
    pub dockerfile: String,

    /// Build context
    pub context: String,

    /// Target repository
    pub repo: String,

    /// Image tags
    pub tags: Vec<String>,

    /// Build args (legacy list)
    pub args: Vec<String>,

    /// Build args whose values may contain commas
    pub args_new: Vec<String>,

    /// Select `args_new` over `args`
    pub multiple_build_args: bool,

    /// Target stage
    pub target: Option<String>,

    /// Target platform(s)
    pub platform: Option<String>,

    /// Squash layers
    pub squash: bool,

    /// Always pull base images
    pub pull: bool,

    /// Gzip the build context
    pub compress: bool,

    /// Disable the build cache
    pub no_cache: bool,

    /// Suppress build output
    pub quiet: bool,

    /// Cache import descriptors
    pub cache_from: Vec<String>,

    /// Cache export descriptors
    pub cache_to: Vec<String>,

    /// Append `use_path_style=true` to s3 cache descriptors
    pub s3_path_style: bool,

    /// Extra host:ip mappings
    pub add_host: Vec<String>,

    /// Inline secret, passed through as-is
    pub secret: Option<String>,

    /// Secrets sourced from environment variables (`id=ENV_NAME`)
    pub secrets_from_env: Vec<String>,

    /// Secrets sourced from files (`id=/path`)
    pub secrets_from_file: Vec<String>,

    /// SSH agent socket or key spec
    pub ssh: Option<String>,

    /// Emit OCI labels automatically
    pub auto_label: bool,

    /// Extra OCI label-schema entries
    pub label_schema: Vec<String>,

    /// Arbitrary labels, emitted unprefixed
    pub labels: Vec<String>,

    /// Repository web link
    pub link: Option<String>,

    /// Load into the local image store on dry runs
    pub load_on_dry_run: bool,

    /// Raw buildx options, semicolon separated
    pub extra_options: Option<String>,

    /// Credentials replacing cache descriptor placeholders
    pub cache_credentials: CacheCredentials,

    /// Proxy values forwarded as build args
    pub proxy: ProxySettings,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            remote: None,
            name: "00000000".to_string(),
            dockerfile: "Dockerfile".to_string(),
            context: ".".to_string(),
            repo: String::new(),
            tags: vec!["latest".to_string()],
            args: vec![],
            args_new: vec![],
            multiple_build_args: false,
            target: None,
            platform: None,
            squash: false,
            pull: true,
            compress: false,
            no_cache: false,
            quiet: false,
            cache_from: vec![],
            cache_to: vec![],
            s3_path_style: false,
            add_host: vec![],
            secret: None,
            secrets_from_env: vec![],
            secrets_from_file: vec![],
            ssh: None,
            auto_label: true,
            label_schema: vec![],
            labels: vec![],
            link: None,
            load_on_dry_run: false,
            extra_options: None,
            cache_credentials: CacheCredentials::default(),
            proxy: ProxySettings::default(),
        }
    }
}

/// Ephemeral buildx builder options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Requested builder name
    pub name: Option<String>,

    /// Buildx driver
    pub driver: Option<String>,

    /// Driver options accepted by every buildx release
    pub driver_opts: Vec<String>,

    /// Driver options in the newer format
    pub driver_opts_new: Vec<String>,

    /// Endpoint for the remote driver
    pub remote_conn: Option<String>,

    /// buildkitd config file
    pub daemon_config: Option<String>,

    /// Use a buildkit image shipped with the step
    pub use_loaded_buildkit: bool,

    /// Directory holding `version.json` and `buildkit.tar`
    pub assets_dir: PathBuf,

    /// Explicit buildkit image to pin
    pub buildkit_version: Option<String>,

    /// Proxy handed to the builder container
    pub http_proxy: Option<String>,

    pub https_proxy: Option<String>,

    /// buildkitd `--tls-handshake-timeout`
    pub tls_handshake_timeout: Option<String>,

    /// buildkitd `--response-header-timeout`
    pub response_header_timeout: Option<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            name: None,
            driver: None,
            driver_opts: vec![],
            driver_opts_new: vec![],
            remote_conn: None,
            daemon_config: None,
            use_loaded_buildkit: true,
            assets_dir: PathBuf::from("buildkit"),
            buildkit_version: None,
            http_proxy: None,
            https_proxy: None,
            tls_handshake_timeout: None,
            response_header_timeout: None,
        }
    }
}

/// Embedded docker daemon options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Daemon is already running elsewhere
    pub disabled: bool,

    /// Daemon executable
    pub dockerd_exe: String,

    pub storage_driver: Option<String>,

    pub storage_path: String,

    /// Mark the push registry insecure
    pub insecure: bool,

    pub mirror: Option<String>,

    pub bip: Option<String>,

    pub dns: Vec<String>,

    pub dns_search: Vec<String>,

    pub mtu: Option<String>,

    pub ipv6: bool,

    pub debug: bool,

    /// Seccomp profile passed when the file exists
    pub seccomp_profile: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            dockerd_exe: "dockerd".to_string(),
            storage_driver: None,
            storage_path: "/var/lib/docker".to_string(),
            insecure: false,
            mirror: None,
            bip: None,
            dns: vec![],
            dns_search: vec![],
            mtu: None,
            ipv6: false,
            debug: false,
            seccomp_profile: PathBuf::from("/etc/docker/default.json"),
        }
    }
}

/// Metadata recorded in the artifact file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Registry flavor: Docker, ECR, GCR, GAR, ACR
    pub registry_type: String,

    /// Registry URL where the image can be viewed
    pub registry: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            registry_type: "Docker".to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[pipeline]"));
        assert!(toml.contains("[build]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.build.tags, vec!["latest"]);
        assert!(config.pipeline.cleanup);
        assert!(config.base_image.is_none());
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [build]
            repo = "octo/app"
            cache_to = ["type=registry,ref=octo/app:cache"]

            [builder]
            driver = "docker-container"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.build.repo, "octo/app");
        assert_eq!(config.build.dockerfile, "Dockerfile"); // default preserved
        assert_eq!(config.builder.driver.as_deref(), Some("docker-container"));
        assert!(config.builder.use_loaded_buildkit);
    }

    #[test]
    fn login_predicates_ignore_empty_values() {
        let login = LoginConfig {
            password: Some(String::new()),
            access_token: Some("tok".to_string()),
            ..LoginConfig::default()
        };
        assert!(!login.has_password());
        assert!(login.has_access_token());
        assert!(!login.has_config());
    }

    #[test]
    fn proxy_lookup_by_key() {
        let proxy = ProxySettings {
            http_proxy: Some("http://proxy:3128".to_string()),
            https_proxy: Some(String::new()),
            no_proxy: None,
        };
        assert_eq!(proxy.get("http_proxy"), Some("http://proxy:3128"));
        assert_eq!(proxy.get("https_proxy"), None);
        assert_eq!(proxy.get("ftp_proxy"), None);
    }
}
