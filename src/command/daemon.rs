//! Embedded docker daemon command line

use crate::backend::{BackendCommand, CommandKind};
use crate::config::DaemonConfig;

/// Socket the embedded daemon listens on
pub const DOCKER_SOCKET_HOST: &str = "--host=unix:///var/run/docker.sock";

/// `dockerd ...` for the embedded daemon.
///
/// `registry` is marked insecure when the daemon config asks for it.
pub fn daemon(daemon: &DaemonConfig, registry: &str) -> BackendCommand {
    let mut cmd = BackendCommand::new(&daemon.dockerd_exe, CommandKind::Daemon)
        .args(["--data-root", daemon.storage_path.as_str(), DOCKER_SOCKET_HOST]);

    if daemon.seccomp_profile.is_file() {
        cmd = cmd.arg(format!("--seccomp-profile={}", daemon.seccomp_profile.display()));
    }
    if let Some(driver) = daemon.storage_driver.as_deref().filter(|d| !d.is_empty()) {
        cmd = cmd.args(["-s", driver]);
    }
    if daemon.insecure && !registry.is_empty() {
        cmd = cmd.args(["--insecure-registry", registry]);
    }
    if daemon.ipv6 {
        cmd = cmd.arg("--ipv6");
    }
    if let Some(mirror) = daemon.mirror.as_deref().filter(|m| !m.is_empty()) {
        cmd = cmd.args(["--registry-mirror", mirror]);
    }
    if let Some(bip) = daemon.bip.as_deref().filter(|b| !b.is_empty()) {
        cmd = cmd.args(["--bip", bip]);
    }
    for dns in &daemon.dns {
        cmd = cmd.args(["--dns", dns.as_str()]);
    }
    for search in &daemon.dns_search {
        cmd = cmd.args(["--dns-search", search.as_str()]);
    }
    if let Some(mtu) = daemon.mtu.as_deref().filter(|m| !m.is_empty()) {
        cmd = cmd.args(["--mtu", mtu]);
    }
    if daemon.debug {
        cmd = cmd.arg("--debug");
    }
    cmd
}
