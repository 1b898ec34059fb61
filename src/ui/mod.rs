//! Console output for the build log
//!
//! CI logs get plain, prefixed lines. An interactive terminal gets
//! `cliclack` log lines and spinners instead.
//!
//! # Example
//!
//! ```rust,ignore
//! use buildx_step::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Waiting for docker daemon...");
//! spinner.stop("Docker daemon ready");
//!
//! ui::step_ok(&ctx, "Logged in to ghcr.io");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, outro_error, outro_success, remark, section, step_error_detail, step_info, step_ok,
    step_warn, step_warn_hint, trace,
};
pub use progress::TaskSpinner;
