// src/errors.rs

//! Crate-wide error type and the classification the watch state machine
//! uses to decide between "change mode and keep going" and "stop".

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot watch {}: {source}", path.display())]
    Recoverable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How the state machine treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Target path (or one of its components) is missing.
    NotFound,
    /// Partial or failed read while the file was believed present.
    Io,
    /// Watch registration failed for a reason other than a missing path.
    Recoverable,
    /// The event loop cannot continue.
    Fatal,
}

impl MonitorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            MonitorError::NotFound(_) => ErrorClass::NotFound,
            MonitorError::Io { .. } => ErrorClass::Io,
            MonitorError::Recoverable { .. } => ErrorClass::Recoverable,
            MonitorError::ConfigError(_)
            | MonitorError::Fatal(_)
            | MonitorError::IoError(_)
            | MonitorError::TomlError(_)
            | MonitorError::Other(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// Classify a failed read of `path`.
    pub fn from_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            MonitorError::NotFound(path)
        } else {
            MonitorError::Io { path, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
