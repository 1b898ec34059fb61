//! Command synthesis
//!
//! Pure functions turning configuration into `BackendCommand`s. Nothing in
//! this module spawns a process or reads the environment.

mod build;
mod builder;
mod cache;
mod daemon;
mod login;
mod proxy;

pub use build::{build, secret_arg, BuildInvocation, LABEL_PREFIX};
pub use builder::{
    builder_create, builder_inspect, builder_remove, update_image_version,
    DEFAULT_DRIVER, DOCKER_CONTAINER_DRIVER, REMOTE_DRIVER,
};
pub use cache::{
    apply_path_style, sanitize_descriptor, AWS_PLACEHOLDER, GCP_PLACEHOLDER,
};
pub use daemon::{daemon, DOCKER_SOCKET_HOST};
pub use login::{login, login_access_token, scrub_password_warning, PASSWORD_WARNING};
pub use proxy::{add_proxy_build_args, has_build_arg};

use crate::backend::{BackendCommand, CommandKind};

/// `docker version`
pub fn version(docker: &str) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::Version).arg("version")
}

/// `docker info`, also used as the daemon readiness check
pub fn info(docker: &str) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::Info).arg("info")
}

/// `docker image load` with the tarball on stdin
pub fn image_load(docker: &str, tarball: Vec<u8>) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::ImageLoad)
        .args(["image", "load"])
        .with_stdin(tarball)
}

/// `docker rmi <image>`
pub fn remove_image(docker: &str, image: &str) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::RemoveImage).args(["rmi", image])
}

/// `docker system prune -f`
pub fn prune(docker: &str) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::Prune).args(["system", "prune", "-f"])
}
