//! Log output: console plus one file per run under `<root>/logs`

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use rundown_core::file_io::timestamp_label;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "rundown_core=info,rundown_cli=info";
const VERBOSE_FILTER: &str = "rundown_core=debug,rundown_cli=debug";

/// Install the global subscriber. With `log_dir`, also write
/// `rundown_<timestamp>.log` there and return its path.
///
/// `RUST_LOG` overrides the default filter.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }));

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
            let path = dir.join(format!("rundown_{}.log", timestamp_label(&Local::now())));
            let file = File::create(&path).with_context(|| format!("creating log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("installing log subscriber")?;

    Ok(log_path)
}
