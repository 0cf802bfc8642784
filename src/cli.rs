// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RawConfigFile;
use crate::types::BackendKind;

/// Command-line arguments for `linstor-monitord`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "linstor-monitord",
    version,
    about = "Enable or disable the LINSTOR controller when this host's pool role changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to an optional config file (TOML).
    ///
    /// Without it the built-in defaults are used.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// File whose first line declares the node's role.
    #[arg(long, value_name = "PATH")]
    pub watch_file: Option<PathBuf>,

    /// Periodic interval in milliseconds.
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Role marker that designates the master.
    #[arg(long, value_name = "TOKEN")]
    pub marker: Option<String>,

    /// Service to enable on the master and disable elsewhere.
    #[arg(long, value_name = "UNIT")]
    pub service: Option<String>,

    /// Notification backend (inotify, notify, poll).
    #[arg(long, value_name = "KIND", value_parser = parse_backend)]
    pub backend: Option<BackendKind>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MONITORD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Reconcile once based on the current file content, no watching.
    #[arg(long)]
    pub once: bool,

    /// Validate and print the resolved settings, but don't touch any service.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    s.parse()
}

impl CliArgs {
    /// Apply command-line overrides on top of file/default settings.
    pub fn apply_overrides(&self, raw: &mut RawConfigFile) {
        if let Some(path) = &self.watch_file {
            raw.watch.path = path.clone();
        }
        if let Some(interval) = self.interval_ms {
            raw.watch.interval_ms = interval;
        }
        if let Some(marker) = &self.marker {
            raw.watch.marker = marker.clone();
        }
        if let Some(service) = &self.service {
            raw.service.name = service.clone();
        }
        if let Some(kind) = self.backend {
            raw.backend.kind = kind;
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
