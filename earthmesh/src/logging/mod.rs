//! Logging setup.
//!
//! Diagnostics go to stderr; stdout carries only the contract log (see
//! [`crate::report`]). An optional plain-text log file receives the same
//! events through a non-blocking writer.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "earthmesh=info,warn";

/// Filter used with `--verbose` when `RUST_LOG` is unset.
pub const VERBOSE_FILTER: &str = "earthmesh=debug,info";

/// Logging options.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Raise the default level to debug.
    pub verbose: bool,
    /// Additional log file.
    pub log_file: Option<PathBuf>,
}

/// Builds the filter: `RUST_LOG` wins, otherwise the default for the
/// verbosity.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs the global subscriber.
///
/// Returns the file writer's guard when a log file is configured; it must
/// be held until the program exits or buffered lines are lost. Calling this
/// twice leaves the first subscriber in place.
///
/// # Errors
///
/// Returns [`Error::Config`] if the log file path has no file name or its
/// directory cannot be created.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter(config.verbose))
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("log file '{}' has no file name", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| Error::Config(format!("cannot create {}: {}", dir.display(), e)))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
