use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which notification backend to drive the watch with.
///
/// - `Inotify`: the Linux kernel facility, used directly (default on Linux).
/// - `Notify`: the platform's recommended API through the `notify` crate
///   (default elsewhere).
/// - `Poll`: periodic rescans through notify's polling watcher, for
///   filesystems that do not deliver change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Inotify,
    Notify,
    Poll,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            BackendKind::Inotify
        } else {
            BackendKind::Notify
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inotify" => Ok(BackendKind::Inotify),
            "notify" => Ok(BackendKind::Notify),
            "poll" => Ok(BackendKind::Poll),
            other => Err(format!(
                "invalid backend: {other} (expected \"inotify\", \"notify\" or \"poll\")"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Inotify => f.write_str("inotify"),
            BackendKind::Notify => f.write_str("notify"),
            BackendKind::Poll => f.write_str("poll"),
        }
    }
}
