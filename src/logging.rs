//! Tracing setup for the `memix` binary.
//!
//! Linux hosts log to the systemd journal under the `memix` identifier when it
//! is reachable; otherwise events land in `memix.log`, rotated daily.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "MEMIX_LOG";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `MEMIX_LOG` in `EnvFilter` syntax, `info` when unset or unparsable.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memix")
        .join("logs")
}

pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald.with_syslog_identifier("memix".to_string()))
                .try_init()?;
            return Ok(());
        }
    }

    init_file(&log_dir.unwrap_or_else(default_log_dir))
}

fn init_file(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "memix.log"));
    let _ = FILE_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;

    tracing::debug!("Writing logs under {}", log_dir.display());
    Ok(())
}
