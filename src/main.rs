//! # Bing Background
//!
//! Downloads Microsoft Bing's image of the day and sets it as the desktop
//! background. Runs once per invocation; the recurring schedule is owned by
//! the OS (a systemd user timer on Linux, Task Scheduler on Windows).
//!
//! ## Architecture
//! - `bing.rs` - Bing client: metadata fetch, asset probe, image download
//! - `asset.rs` - Resolution tiers and asset URL resolution
//! - `display.rs` - Display size detection
//! - `metadata.rs` - EXIF title/subject/copyright embedding
//! - `store.rs` - Dated on-disk image store
//! - `background/` - Per-desktop background settings stores
//! - `pipeline.rs` - Runs the steps in order under one timeout
//! - `schedule.rs` - Registers the hourly and login jobs
//! - `config.rs` - User configuration
//!
//! ## CLI Usage
//! - No arguments: update the background once, printing a summary
//! - `--silent`: same, without the summary (used by the scheduled jobs)
//! - `--install` / `--uninstall`: register or remove the scheduled jobs

mod asset;
mod background;
mod bing;
mod config;
mod display;
mod error;
mod host;
mod metadata;
mod pipeline;
mod schedule;
mod store;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::background::BackgroundSettingsStore;
use crate::config::Config;
use crate::display::{DisplayInfoProvider, FixedDisplay, SystemDisplay};
use crate::pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(version, about = "Sets the Bing image of the day as the desktop background")]
struct Cli {
    /// Register the hourly and login jobs, then exit
    #[arg(long, conflicts_with = "uninstall")]
    install: bool,

    /// Remove the scheduled jobs, then exit
    #[arg(long)]
    uninstall: bool,

    /// Don't print a summary (logging is unaffected)
    #[arg(long)]
    silent: bool,

    /// Alternate configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn init_tracing(config: &Config) {
    let filter = config
        .log_filter
        .as_deref()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    init_tracing(&config);
    write_default_config(&cli, &config);

    if cli.install || cli.uninstall {
        return match manage_schedule(cli.install) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "scheduling failed");
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let background: Arc<dyn BackgroundSettingsStore> = match background::system_store() {
        Ok(store) => Arc::from(store),
        Err(e) => return report_failure(&e, cli.silent),
    };
    let display: Arc<dyn DisplayInfoProvider> = match config.display {
        Some(size) => Arc::new(FixedDisplay(size)),
        None => Arc::new(SystemDisplay),
    };

    match Pipeline::new(config, display, background).run().await {
        Ok(path) => {
            if !cli.silent {
                eprintln!("Background set to {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => report_failure(&e, cli.silent),
    }
}

/// Leaves an editable config file behind on first run.
fn write_default_config(cli: &Cli, config: &Config) {
    let Some(path) = cli.config.clone().or_else(Config::default_path) else {
        return;
    };
    if path.exists() {
        return;
    }
    match config.save_to(&path) {
        Ok(()) => tracing::info!(path = %path.display(), "wrote default configuration"),
        Err(e) => tracing::warn!(error = %e, "could not write default configuration"),
    }
}

fn report_failure(err: &error::PipelineError, silent: bool) -> ExitCode {
    tracing::error!(error = %err, "background update failed");
    if !silent {
        eprintln!("{}", err.summary());
    }
    ExitCode::FAILURE
}

/// Installs (`true`) or removes the recurring jobs.
fn manage_schedule(install: bool) -> anyhow::Result<()> {
    let job = schedule::system_job().map_err(anyhow::Error::msg)?;

    if install {
        let exe = std::env::current_exe().context("could not locate the running executable")?;
        let working_dir = std::env::current_dir().context("could not read the current directory")?;
        job.install(&exe, &working_dir)
            .map_err(anyhow::Error::msg)
            .context("installing the scheduled jobs")?;
        println!("Scheduled hourly updates for {}", exe.display());
    } else {
        if !job.exists() {
            println!("No scheduled jobs installed");
            return Ok(());
        }
        job.remove()
            .map_err(anyhow::Error::msg)
            .context("removing the scheduled jobs")?;
        println!("Scheduled updates removed");
    }
    Ok(())
}
