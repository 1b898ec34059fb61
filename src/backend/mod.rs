//! Build backend process layer
//!
//! Commands are synthesized as plain values (`BackendCommand`) and executed
//! through the `Backend` trait, so the pipeline never spawns processes
//! directly:
//! - `DockerCli`: runs the docker CLI through `tokio::process`

mod docker;
mod runtime;
#[cfg(test)]
pub(crate) mod scripted;

pub use docker::DockerCli;
pub use runtime::Backend;

use std::borrow::Cow;
use std::fmt;

/// What a backend command does, used for failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Version,
    Info,
    Login,
    Build,
    BuilderCreate,
    BuilderInspect,
    BuilderRemove,
    ImageLoad,
    RemoveImage,
    Prune,
    Daemon,
}

impl CommandKind {
    /// Failures of these commands are reported as warnings only
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::RemoveImage | Self::Prune)
    }
}

/// A fully synthesized backend invocation
#[derive(Clone, PartialEq, Eq)]
pub struct BackendCommand {
    /// Executable to run
    pub program: String,
    /// Arguments, excluding the program
    pub args: Vec<String>,
    /// Bytes written to the process stdin
    pub stdin: Option<Vec<u8>>,
    /// Command classification
    pub kind: CommandKind,
}

impl BackendCommand {
    pub fn new(program: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            kind,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` to the process on stdin
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Arguments safe to print: the value after `-p` is masked for logins and
    /// credential fields of cache descriptors are masked everywhere
    pub fn display_args(&self) -> Vec<Cow<'_, str>> {
        let mut after: Option<&str> = None;
        self.args
            .iter()
            .map(|arg| {
                let shown = match after.take() {
                    Some("-p" | "--password") => Cow::Borrowed(MASK),
                    Some("--cache-from" | "--cache-to") => mask_descriptor(arg),
                    _ => Cow::Borrowed(arg.as_str()),
                };
                let is_password =
                    self.kind == CommandKind::Login && (arg == "-p" || arg == "--password");
                if is_password || arg == "--cache-from" || arg == "--cache-to" {
                    after = Some(arg.as_str());
                }
                shown
            })
            .collect()
    }

    /// Subcommand words after the program, e.g. `["buildx", "build"]`
    pub fn subcommand(&self) -> Vec<&str> {
        self.args
            .iter()
            .take_while(|a| !a.starts_with('-'))
            .map(String::as_str)
            .collect()
    }
}

const MASK: &str = "******";

/// Cache descriptor fields that carry live credentials
const SECRET_FIELDS: [&str; 3] = ["access_key_id", "secret_access_key", "gcp_json_key"];

/// Mask credential values in a `type=...,key=value` descriptor. A verbatim
/// JSON key contains commas, so fragments up to the next `name=` field are
/// dropped along with it.
fn mask_descriptor(descriptor: &str) -> Cow<'_, str> {
    let has_secret = descriptor
        .split(',')
        .filter_map(|field| field.split_once('='))
        .any(|(key, _)| SECRET_FIELDS.contains(&key.trim()));
    if !has_secret {
        return Cow::Borrowed(descriptor);
    }

    let mut fields: Vec<String> = Vec::new();
    let mut skipping = false;
    for field in descriptor.split(',') {
        match field.split_once('=') {
            Some((key, _)) if SECRET_FIELDS.contains(&key.trim()) => {
                fields.push(format!("{}={}", key, MASK));
                skipping = true;
            }
            Some((key, _)) if is_field_name(key) => {
                fields.push(field.to_string());
                skipping = false;
            }
            _ if skipping => {}
            _ => fields.push(field.to_string()),
        }
    }
    Cow::Owned(fields.join(","))
}

fn is_field_name(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for BackendCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.display_args() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

// Stdin may carry tokens or tarballs; never print it.
impl fmt::Debug for BackendCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCommand")
            .field("program", &self.program)
            .field("args", &self.display_args())
            .field("stdin", &self.stdin.as_ref().map(|s| format!("<{} bytes>", s.len())))
            .field("kind", &self.kind)
            .finish()
    }
}

/// Captured result of a finished backend command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, the way a terminal would show them
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !self.stderr.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}
