//! Diagnostics on stderr. Stdout is reserved for listings, JSON and exports.

use std::env;
use std::io;

use clap::ValueEnum;
use tracing::Level;

pub const LOG_LEVEL_ENV: &str = "CHRONOS_GANTT_LOG";

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// The `--log-level` flag, else a readable `CHRONOS_GANTT_LOG`, else warn.
pub fn resolve_level(flag: Option<LogLevel>, env_value: Option<&str>) -> Level {
    flag.map(Level::from)
        .or_else(|| env_value.and_then(|raw| raw.trim().parse().ok()))
        .unwrap_or(Level::WARN)
}

/// Installs the global subscriber. A second call keeps the first one.
pub fn init_logging(flag: Option<LogLevel>) {
    let env_value = env::var(LOG_LEVEL_ENV).ok();
    let level = resolve_level(flag, env_value.as_deref());

    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .try_init();
    if installed.is_err() {
        return;
    }

    if flag.is_none() {
        if let Some(raw) = env_value.filter(|raw| raw.trim().parse::<Level>().is_err()) {
            tracing::warn!(value = %raw, "ignoring unrecognised {LOG_LEVEL_ENV}");
        }
    }
}
