//! buildx-step - container image build step for CI
//!
//! Entry point: resolves configuration and runs the pipeline.

use buildx_step::backend::DockerCli;
use buildx_step::cli::Cli;
use buildx_step::config::{Config, ConfigManager};
use buildx_step::error::{StepError, StepResult};
use buildx_step::pipeline::Pipeline;
use buildx_step::ui::{self, UiContext};
use clap::Parser;
use console::style;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn load_config(cli: &Cli) -> StepResult<Config> {
    if let Some(ref path) = cli.config {
        return ConfigManager::with_path(path.clone()).load_required().await;
    }

    let cwd = std::env::current_dir().map_err(|e| StepError::io("getting current directory", e))?;
    match ConfigManager::find_local_config(&cwd) {
        Some(path) => ConfigManager::with_path(path).load().await,
        None => Ok(Config::default()),
    }
}

fn init_tracing(verbose: u8, config: &Config) {
    // 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
    let level = match verbose.max(u8::from(config.general.verbose)) {
        0 => "buildx_step=warn",
        1 => "buildx_step=info",
        _ => "buildx_step=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run() -> StepResult<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let mut config = load_config(&cli).await?;
    cli.apply(&mut config);
    init_tracing(verbose, &config);
    debug!("Building {}", config.build.repo);

    let ctx = UiContext::detect();
    ui::intro(&ctx, "buildx-step");

    let pipeline = Pipeline::new(config, Arc::new(DockerCli::new())).with_ui(ctx.clone());
    match pipeline.run().await {
        Ok(()) => {
            ui::outro_success(&ctx, "Build step finished");
            Ok(())
        }
        Err(e) => {
            ui::outro_error(&ctx, "Build step failed");
            Err(e)
        }
    }
}
