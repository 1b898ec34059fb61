//! Registry login commands

use crate::backend::{BackendCommand, CommandKind};
use crate::config::LoginConfig;

/// Warning the docker CLI prints for `-p`; stripped before output is surfaced
pub const PASSWORD_WARNING: &str =
    "WARNING! Using --password via the CLI is insecure. Use --password-stdin.";

/// Username registries expect alongside an OAuth2 access token
const TOKEN_USERNAME: &str = "oauth2accesstoken";

/// Password login, using the email-bearing form when an email is set
pub fn login(docker: &str, login: &LoginConfig) -> BackendCommand {
    let mut cmd = BackendCommand::new(docker, CommandKind::Login).args([
        "login",
        "-u",
        login.username.as_deref().unwrap_or_default(),
        "-p",
        login.password.as_deref().unwrap_or_default(),
    ]);
    if let Some(email) = login.email.as_deref().filter(|e| !e.is_empty()) {
        cmd = cmd.args(["-e", email]);
    }
    cmd.arg(&login.registry)
}

/// Token login; the token only ever travels over stdin
pub fn login_access_token(docker: &str, registry: &str, token: &str) -> BackendCommand {
    BackendCommand::new(docker, CommandKind::Login)
        .args(["login", "-u", TOKEN_USERNAME, "--password-stdin", registry])
        .with_stdin(token)
}

/// Remove the CLI password warning from captured login output
pub fn scrub_password_warning(output: &str) -> String {
    output.replace(PASSWORD_WARNING, "").trim().to_string()
}
