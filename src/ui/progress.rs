//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for waits with a known number of attempts
pub struct TaskSpinner {
    bar: Option<ProgressBar>,
    message: String,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(spinner_style) = ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}  {elapsed:.dim}")
            {
                bar.set_style(spinner_style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar
        });
        Self {
            bar,
            message: String::new(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        self.message = message.to_string();

        if let Some(ref bar) = self.bar {
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Show which attempt is running; silent in plain mode
    pub fn attempt(&self, n: u32, total: u32) {
        if let Some(ref bar) = self.bar {
            bar.set_message(format!("{} ({}/{})", self.message, n, total));
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        self.finish();
        println!("{} {}", style("[OK]").green(), message);
    }

    /// Stop with warning message
    pub fn stop_warn(&mut self, message: &str) {
        self.finish();
        println!("{} {}", style("[WARN]").yellow(), message);
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

impl Drop for TaskSpinner {
    fn drop(&mut self) {
        self.finish();
    }
}
