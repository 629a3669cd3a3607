//! Logging setup for servers and daemons.
//!
//! A detached daemon has no terminal, so its log goes to a file (usually the
//! `log_file` from the server config). Interactive tools log to stderr.
//!
//! # Example
//!
//! ```rust,no_run
//! use rpc_remotes::logging::init_logging;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging("/tmp/rpc/7890.log")?;
//!
//!     tracing::info!("Server starting");
//!     Ok(())
//! }
//! ```

use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::daemon::expand_path;

/// `RUST_LOG` if set, `info` otherwise.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize file logging, appending to `path`.
///
/// # Arguments
/// * `path` - Log file; `~` is expanded and parent directories are created
pub fn init_logging(path: impl AsRef<Path>) -> Result<()> {
    let log_path = expand_path(path.as_ref());
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let subscriber = tracing_subscriber::registry().with(env_filter()).with(
        fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    Ok(())
}

/// Initialize logging to stderr, for foreground servers and CLIs.
pub fn init_stderr_logging() -> Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false));

    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    Ok(())
}

/// Initialize file logging with daily rotation.
///
/// `path` names the base file; older logs are kept as `<name>.YYYY-MM-DD`
/// next to it.
#[cfg(feature = "log-rotation")]
pub fn init_logging_with_rotation(path: impl AsRef<Path>) -> Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let log_path = expand_path(path.as_ref());
    let dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = log_path
        .file_name()
        .context("Log path has no file name")?;
    fs::create_dir_all(dir).context("Failed to create log directory")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, name);

    let subscriber = tracing_subscriber::registry().with(env_filter()).with(
        fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true),
    );

    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    Ok(())
}
