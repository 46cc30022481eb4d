//! # Rundown CLI
//!
//! Command line driver for a load rundown over a directory of floor models.
//!
//! # Commands
//!
//! - `rundown init <settings>` - Write a default settings file
//! - `rundown validate <settings>` - Check settings, floor files and model templates
//! - `rundown run <settings>` - Run the rundown and print the report as JSON
//!
//! On a fatal error the log stays on screen for `exit_delay_secs` before the
//! process exits with status 1, unless the settings ask for `debug`.

mod logging;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rundown_core::controller::validate_template;
use rundown_core::engine::table::TableEngine;
use rundown_core::engine::{AnalysisEngine, OpenModel};
use rundown_core::sequence::RunSequence;
use rundown_core::{load_settings, save_settings, RunLock, RundownController, RundownSettings};
use tracing::{error, info};

/// Multi-storey load rundown
#[derive(Parser)]
#[command(name = "rundown")]
#[command(about = "Run gravity loads down a stack of floor models", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a settings file with default values
    Init {
        /// Settings file to create (e.g. project/rundown.json)
        #[arg(name = "SETTINGS")]
        settings: PathBuf,
    },

    /// Check settings, floor files and model templates without running
    Validate {
        #[arg(name = "SETTINGS")]
        settings: PathBuf,
    },

    /// Run the rundown
    Run {
        #[arg(name = "SETTINGS")]
        settings: PathBuf,

        /// Name recorded in the project lock (defaults to the login name)
        #[arg(long)]
        user: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { settings } => init(&settings, cli.verbose),
        Commands::Validate { settings } => validate(&settings, cli.verbose),
        Commands::Run { settings, user } => run(&settings, user, cli.verbose),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init(path: &Path, verbose: bool) -> Result<()> {
    logging::init(None, verbose)?;
    if path.exists() {
        bail!("{} already exists, not overwriting", path.display());
    }
    save_settings(&RundownSettings::default(), path)
        .with_context(|| format!("writing settings to {}", path.display()))?;
    info!(path = %path.display(), "Default settings written");
    Ok(())
}

fn load(path: &Path) -> Result<RundownSettings> {
    load_settings(path).with_context(|| format!("loading settings from {}", path.display()))
}

fn validate(path: &Path, verbose: bool) -> Result<()> {
    logging::init(None, verbose)?;
    let settings = load(path)?;
    settings.validate()?;

    let sequence = RunSequence::build(&settings)?;
    sequence.check_files()?;
    for pass in sequence.passes() {
        info!(floor = %pass.label, path = %pass.path.display(), "Floor pass");
    }

    let engine = TableEngine::on_disk();
    let mut checked = BTreeSet::new();
    for pass in sequence.passes() {
        if !checked.insert(pass.path.clone()) {
            continue;
        }
        let model = OpenModel::new(engine.open(&pass.path)?);
        validate_template(&*model, &settings.layers, &pass.floor)?;
        model.close()?;
    }

    info!(passes = sequence.len(), models = checked.len(), "Settings are valid");
    Ok(())
}

fn run(path: &Path, user: Option<String>, verbose: bool) -> Result<()> {
    let settings = load(path)?;
    let log_path = logging::init(Some(&settings.root().join("logs")), verbose)?;
    if let Some(log_path) = &log_path {
        info!(log = %log_path.display(), "Logging to file");
    }

    let exit_delay = settings.exit_delay_secs;
    let debug = settings.debug;

    let result = run_locked(settings, user);
    if let Err(e) = &result {
        error!("{:#}", e);
        if !debug && exit_delay > 0 {
            info!("Exiting in {} seconds", exit_delay);
            thread::sleep(Duration::from_secs(exit_delay));
        }
    }
    result
}

fn run_locked(settings: RundownSettings, user: Option<String>) -> Result<()> {
    let user = user
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .unwrap_or_else(|| "unknown".to_string());
    let lock = RunLock::acquire(settings.root(), user)?;

    let report = RundownController::new(TableEngine::on_disk(), settings)
        .with_run_lock(lock)
        .run()?;
    if let Some(export) = &report.export_path {
        info!(path = %export.display(), "Centroid export");
    }

    let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
    println!("{}", json);
    Ok(())
}
