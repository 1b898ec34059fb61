//! buildx-step - container image build step for CI
//!
//! Logs in to the target registry, provisions an ephemeral buildx builder,
//! runs the build while extracting cache metrics from its output, and
//! reports the pushed digest back to the CI system.

pub mod artifact;
pub mod backend;
pub mod builder;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod ui;

pub use error::{StepError, StepResult};
