//! Error types for buildx-step
//!
//! All modules use `StepResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for build step operations
pub type StepResult<T> = Result<T, StepError>;

/// All errors that can occur while running the build step
#[derive(Error, Debug)]
pub enum StepError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // Authentication errors
    #[error("Error authenticating to {registry}: {output}")]
    Auth { registry: String, output: String },

    #[error("Login to {0} did not succeed")]
    LoginRejected(String),

    // Builder provisioning errors
    #[error("Error while creating buildx builder: {0}")]
    BuilderCreate(String),

    #[error("Error while bootstrapping buildx builder {name}: {output}")]
    BuilderBootstrap { name: String, output: String },

    // Backend process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with code {code}: {command}")]
    CommandExit { command: String, code: i32 },

    #[error("Process terminated by signal: {0}")]
    ProcessSignaled(String),

    // Post-processing errors
    #[error("Unable to read build metadata {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StepError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error (the process could not be spawned)
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether the error came out of builder provisioning
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::BuilderCreate(_) | Self::BuilderBootstrap { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Auth { .. } | Self::LoginRejected(_) => {
                Some("Check the registry address and credentials passed to the step")
            }
            Self::BuilderCreate(_) | Self::BuilderBootstrap { .. } => {
                Some("Check builder driver options; older buildx releases reject the new option format")
            }
            Self::CommandFailed { .. } => Some("Is the docker CLI installed and on PATH?"),
            _ => None,
        }
    }
}
