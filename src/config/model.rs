// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::reconcile::RoleMatcher;
use crate::types::BackendKind;

/// Configuration as read from an optional TOML file.
///
/// Every section and key is optional; an empty file (or no file at all)
/// yields the stock daemon settings:
///
/// ```toml
/// [watch]
/// path = "/etc/xensource/pool.conf"
/// interval_ms = 2000
/// marker = "master"
/// line_limit = 512
/// periodic_reconcile = true
///
/// [service]
/// name = "linstor-controller"
/// program = "systemctl"
/// args = ["--now"]
///
/// [backend]
/// kind = "inotify"
/// poll_interval_ms = 1000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub backend: BackendSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// Absolute path of the file that declares the node's role.
    #[serde(default = "default_watch_path")]
    pub path: PathBuf,

    /// Periodic interval in milliseconds; also the upper bound of every wait.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Leading token of the first line that designates the master.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Maximum number of bytes read from the first line.
    #[serde(default = "default_line_limit")]
    pub line_limit: usize,

    /// Reconcile on every periodic tick, not only on notifications.
    #[serde(default = "default_true")]
    pub periodic_reconcile: bool,
}

fn default_watch_path() -> PathBuf {
    PathBuf::from("/etc/xensource/pool.conf")
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_marker() -> String {
    "master".to_string()
}

fn default_line_limit() -> usize {
    512
}

fn default_true() -> bool {
    true
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            path: default_watch_path(),
            interval_ms: default_interval_ms(),
            marker: default_marker(),
            line_limit: default_line_limit(),
            periodic_reconcile: true,
        }
    }
}

/// `[service]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    /// Unit enabled on the master and disabled everywhere else.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Program invoked as `<program> <enable|disable> <args..> <name>`.
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

fn default_service_name() -> String {
    "linstor-controller".to_string()
}

fn default_program() -> String {
    "systemctl".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--now".to_string()]
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            program: default_program(),
            args: default_args(),
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    #[serde(default)]
    pub kind: BackendKind,

    /// Rescan period for `kind = "poll"`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>`, so holders can rely
/// on the invariants checked in `validate.rs`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSection,
    pub service: ServiceSection,
    pub backend: BackendSection,
    matcher: RoleMatcher,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, matcher: RoleMatcher) -> Self {
        Self {
            watch: raw.watch,
            service: raw.service,
            backend: raw.backend,
            matcher,
        }
    }

    pub fn matcher(&self) -> &RoleMatcher {
        &self.matcher
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.watch.interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.backend.poll_interval_ms)
    }
}
