// src/logging.rs

//! The daemon's `tracing` subscriber.
//!
//! An explicit `--log-level` wins over `MONITORD_LOG`; with neither set we
//! log at `info`. Output is written to stderr, where systemd picks it up for
//! the journal, and colour is only used when stderr is a terminal.

use std::io::IsTerminal;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variable consulted when no level is given on the command line.
pub const LOG_ENV: &str = "MONITORD_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let level = resolve_level(cli_level, env_value.as_deref());

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    Ok(())
}

/// Pick the effective level. An unparsable environment value is ignored.
pub fn resolve_level(cli_level: Option<LogLevel>, env_value: Option<&str>) -> Level {
    cli_level
        .map(Level::from)
        .or_else(|| env_value.and_then(parse_level_str))
        .unwrap_or(Level::INFO)
}

impl From<LogLevel> for Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Parse a level name case-insensitively; `warning` is accepted for `warn`.
pub fn parse_level_str(s: &str) -> Option<Level> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    s.parse().ok()
}
