//! Console and per-run log files.
//!
//! With a log directory configured, each run writes
//! `<log_dir>/<YYYYMMDD>/<app>.<HHMMSS>.<pid>.log` (INFO and WARN) and a
//! sibling `.log.err` (ERROR only). The console always gets everything.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{Level, Metadata};
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::RunnerError;

const DEFAULT_LOG_FILTER: &str = "info";

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub log_dir: Option<&'a Path>,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
    pub out: PathBuf,
    pub err: PathBuf,
}

/// Paths for this run's log pair, without creating anything.
pub fn log_file_paths(log_dir: &Path, app_name: &str, now: chrono::DateTime<chrono::Local>, pid: u32) -> LogFiles {
    let dir = log_dir.join(now.format("%Y%m%d").to_string());
    let base = format!("{}.{}.{}", app_name, now.format("%H%M%S"), pid);
    LogFiles {
        out: dir.join(format!("{}.log", base)),
        err: dir.join(format!("{}.log.err", base)),
    }
}

fn is_out_level(meta: &Metadata<'_>) -> bool {
    let level = *meta.level();
    level == Level::INFO || level == Level::WARN
}

pub fn init_logging(config: LogConfig<'_>) -> Result<Option<LogFiles>, RunnerError> {
    let filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let Some(log_dir) = config.log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .try_init()
            .map_err(|e| RunnerError::Logging(e.to_string()))?;
        return Ok(None);
    };

    let files = log_file_paths(log_dir, config.app_name, chrono::Local::now(), std::process::id());
    if let Some(parent) = files.out.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RunnerError::Logging(format!("{}: {}", parent.display(), e)))?;
    }
    let open = |path: &Path| {
        File::create(path).map_err(|e| RunnerError::Logging(format!("{}: {}", path.display(), e)))
    };
    let out_file = open(&files.out)?;
    let err_file = open(&files.err)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(out_file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter_fn(is_out_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(err_file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .map_err(|e| RunnerError::Logging(e.to_string()))?;

    Ok(Some(files))
}
