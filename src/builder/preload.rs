//! Buildkit image shipped alongside the step

use crate::backend::Backend;
use crate::command;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

const VERSION_FILE: &str = "version.json";
const TARBALL_FILE: &str = "buildkit.tar";

#[derive(Debug, Deserialize)]
struct VersionFile {
    buildkit_version: String,
}

/// Load the bundled buildkit image and return its version.
///
/// Returns `None` unless both the version descriptor parses and the tarball
/// loads into the daemon.
pub async fn discover(backend: &dyn Backend, docker: &str, assets_dir: &Path) -> Option<String> {
    let version_path = assets_dir.join(VERSION_FILE);
    let version = match fs::read_to_string(&version_path).await {
        Ok(raw) => match serde_json::from_str::<VersionFile>(&raw) {
            Ok(file) => Some(file.buildkit_version),
            Err(e) => {
                debug!("Ignoring {}: {}", version_path.display(), e);
                None
            }
        },
        Err(e) => {
            debug!("No preloaded buildkit version at {}: {}", version_path.display(), e);
            None
        }
    };

    let tarball_path = assets_dir.join(TARBALL_FILE);
    let tarball = match fs::read(&tarball_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("No preloaded buildkit image at {}: {}", tarball_path.display(), e);
            return None;
        }
    };

    let loaded = match backend.output(&command::image_load(docker, tarball)).await {
        Ok(out) if out.success() => true,
        Ok(out) => {
            warn!("Error while loading buildkit image: {}", out.combined().trim());
            false
        }
        Err(e) => {
            warn!("Error while loading buildkit image: {}", e);
            false
        }
    };

    let version = version.filter(|_| loaded)?;
    info!("Loaded buildkit image {}", version);
    Some(version)
}
