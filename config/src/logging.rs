use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. When a log file is
/// configured and can be opened, output goes there without ANSI colors;
/// otherwise it goes to stderr. Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter()))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, warning) = match config.file_path() {
        Some(path) => match open_log_file(&path) {
            Ok(file) => (Some((path, file)), None),
            Err(e) => (None, Some(format!("Failed to open log file {}: {e}", path.display()))),
        },
        None => (None, None),
    };

    if let Some((path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .try_init()?;
        tracing::info!(path = %path.display(), "Logging initialized");
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init()?;
    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }
    Ok(())
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
