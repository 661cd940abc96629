//! Logging setup for Switchboard using tracing.
//!
//! Two sinks: a daily-rolling file with thread ids and source locations,
//! and a compact console. HTTP requests are logged by the server's trace
//! layer inside an `http` span carrying `method` and `path`, with
//! `status` and `latency` on the response event.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,switchboard=debug,tower_http=info";

/// Overrides the platform data directory for log files.
pub const LOG_DIR_ENV: &str = "SWITCHBOARD_LOG_DIR";

const LOG_FILE_PREFIX: &str = "switchboard.log";

/// Initialize logging. The returned guard flushes the file writer on drop;
/// keep it alive for the life of the process.
pub fn init() -> Result<(WorkerGuard, PathBuf)> {
    let override_dir = std::env::var_os(LOG_DIR_ENV).map(PathBuf::from);
    let log_dir = resolve_log_dir(override_dir.as_deref())?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(directives.as_deref());

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::debug!(log_dir = %log_dir.display(), "logging ready");

    Ok((guard, log_dir))
}

/// Filter from `RUST_LOG`-style directives; unparsable or absent
/// directives fall back to [`DEFAULT_FILTER`].
fn build_filter(directives: Option<&str>) -> EnvFilter {
    match directives.map(EnvFilter::try_new) {
        Some(Ok(filter)) => filter,
        Some(Err(e)) => {
            eprintln!("Ignoring invalid {}: {}", EnvFilter::DEFAULT_ENV, e);
            EnvFilter::new(DEFAULT_FILTER)
        }
        None => EnvFilter::new(DEFAULT_FILTER),
    }
}

fn resolve_log_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    let dirs = directories::ProjectDirs::from("com", "switchboard", "switchboard")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("logs"))
}
