//! Files handed back to the CI system
//!
//! - digest recovery from the buildx metadata file
//! - the artifact description (`docker/v1`)
//! - the docker client auth file

use crate::config::LoginConfig;
use crate::error::{StepError, StepResult};
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Metadata key holding the pushed image digest
const DIGEST_KEY: &str = "containerimage.digest";

const ARTIFACT_KIND: &str = "docker/v1";

/// Read the image digest buildx recorded in its metadata file
pub async fn get_digest(metadata_file: &Path) -> StepResult<String> {
    let metadata_err = |reason: String| StepError::Metadata {
        path: metadata_file.to_path_buf(),
        reason,
    };

    let raw = fs::read_to_string(metadata_file)
        .await
        .map_err(|e| metadata_err(e.to_string()))?;
    let metadata: Value = serde_json::from_str(&raw).map_err(|e| metadata_err(e.to_string()))?;

    match metadata.get(DIGEST_KEY) {
        Some(Value::String(digest)) => Ok(digest.clone()),
        Some(_) => Err(metadata_err(format!("{} is not a string", DIGEST_KEY))),
        None => Err(metadata_err(format!("{} not found", DIGEST_KEY))),
    }
}

#[derive(Debug, Serialize)]
struct ArtifactFile<'a> {
    kind: &'static str,
    data: ArtifactData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactData<'a> {
    registry_type: &'a str,
    registry_url: &'a str,
    images: Vec<ArtifactImage>,
}

#[derive(Debug, Serialize)]
struct ArtifactImage {
    image: String,
    digest: String,
}

/// What was pushed, for the artifact description
#[derive(Debug, Clone)]
pub struct PushedImage<'a> {
    pub registry_type: &'a str,
    pub registry_url: &'a str,
    pub repo: &'a str,
    pub tags: &'a [String],
    pub digest: &'a str,
}

/// Write the artifact description, one image entry per tag
pub async fn write_artifact_file(path: &Path, pushed: &PushedImage<'_>) -> StepResult<()> {
    let file = ArtifactFile {
        kind: ARTIFACT_KIND,
        data: ArtifactData {
            registry_type: pushed.registry_type,
            registry_url: pushed.registry_url,
            images: pushed
                .tags
                .iter()
                .map(|tag| ArtifactImage {
                    image: format!("{}:{}", pushed.repo, tag),
                    digest: pushed.digest.to_string(),
                })
                .collect(),
        },
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StepError::io(format!("creating {}", parent.display()), e))?;
    }
    let content = serde_json::to_string_pretty(&file)?;
    fs::write(path, content)
        .await
        .map_err(|e| StepError::io(format!("writing artifact file {}", path.display()), e))?;
    debug!("Wrote artifact file {}", path.display());
    Ok(())
}

fn basic_auth(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password))
}

/// Add base image credentials to the `auths` map of a docker config
fn merge_base_image(content: &str, base: &LoginConfig) -> Option<String> {
    let mut config: Map<String, Value> = match serde_json::from_str(content) {
        Ok(Value::Object(map)) => map,
        _ => return None,
    };
    let auths = config
        .entry("auths")
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(auths) = auths else {
        return None;
    };

    let username = base.username.as_deref().unwrap_or_default();
    let password = base.password.as_deref().unwrap_or_default();
    let mut entry = Map::new();
    entry.insert("auth".to_string(), Value::String(basic_auth(username, password)));
    auths.insert(base.registry.clone(), Value::Object(entry));

    serde_json::to_string_pretty(&Value::Object(config)).ok()
}

/// Write `<docker_home>/config.json` with owner-only permissions.
///
/// When base image credentials are given and `content` is a JSON object,
/// they are merged into its `auths`; otherwise `content` is written as is.
pub async fn write_auth_file(
    docker_home: &Path,
    content: &str,
    base_image: Option<&LoginConfig>,
) -> StepResult<PathBuf> {
    let content = match base_image.filter(|b| !b.registry.is_empty()) {
        Some(base) => merge_base_image(content, base).unwrap_or_else(|| {
            warn!("Registry config is not a JSON object; base image credentials not merged");
            content.to_string()
        }),
        None => content.to_string(),
    };

    fs::create_dir_all(docker_home)
        .await
        .map_err(|e| StepError::io(format!("creating {}", docker_home.display()), e))?;

    let path = docker_home.join("config.json");
    fs::write(&path, content)
        .await
        .map_err(|e| StepError::io(format!("writing {}", path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .map_err(|e| StepError::io("setting auth file permissions", e))?;
    }

    debug!("Wrote registry auth file {}", path.display());
    Ok(path)
}
