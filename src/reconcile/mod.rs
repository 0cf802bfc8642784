// src/reconcile/mod.rs

//! Reconciliation: read the pool configuration file, derive this node's
//! role and drive the managed service to match it.
//!
//! Nothing is cached between runs. Every call re-reads the file from scratch,
//! so coalesced or lost notifications never cause a stale decision, and
//! calling [`Reconciler::reconcile`] twice on unchanged content issues the
//! same service call twice.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::bytes::Regex;
use tracing::{debug, error, info};

use crate::errors::{MonitorError, Result};
use crate::fs::FileSystem;
use crate::service::ServiceController;

/// Role derived from the first line of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Standby,
}

impl Role {
    pub fn is_master(self) -> bool {
        matches!(self, Role::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Standby => f.write_str("standby"),
        }
    }
}

/// Matches the role marker at the start of a line, on a word boundary.
///
/// The marker only counts when it is followed by end of input, a NUL byte,
/// or one of the C `isspace` characters; `"mastered"` does not match
/// `"master"`.
#[derive(Debug, Clone)]
pub struct RoleMatcher {
    marker: String,
    regex: Regex,
}

impl RoleMatcher {
    pub fn new(marker: &str) -> Result<Self> {
        if marker.is_empty() || marker.chars().any(char::is_whitespace) {
            return Err(MonitorError::ConfigError(format!(
                "role marker must be a non-empty token without whitespace (got {marker:?})"
            )));
        }

        let pattern = format!(r"\A{}(?:[ \t\n\x0B\x0C\r\x00]|\z)", regex::escape(marker));
        let regex = Regex::new(&pattern)
            .map_err(|e| MonitorError::ConfigError(format!("invalid role marker: {e}")))?;

        Ok(Self {
            marker: marker.to_string(),
            regex,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn role_of(&self, line: &[u8]) -> Role {
        if self.regex.is_match(line) {
            Role::Master
        } else {
            Role::Standby
        }
    }
}

/// Read at most `limit` bytes of the first line (newline included).
///
/// An empty read is reported as `UnexpectedEof`: a file with no first line
/// says nothing about the role.
pub fn read_first_line(reader: impl Read, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut reader = BufReader::new(reader.take(limit as u64));
    let mut line = Vec::with_capacity(limit.min(512));
    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "no line could be read",
        ));
    }
    Ok(line)
}

/// Reads the configuration file and drives the [`ServiceController`].
pub struct Reconciler<C: ServiceController> {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    matcher: RoleMatcher,
    line_limit: usize,
    service: String,
    controller: C,
}

impl<C: ServiceController> fmt::Debug for Reconciler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("path", &self.path)
            .field("marker", &self.matcher.marker())
            .field("line_limit", &self.line_limit)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl<C: ServiceController> Reconciler<C> {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        path: impl Into<PathBuf>,
        matcher: RoleMatcher,
        line_limit: usize,
        service: impl Into<String>,
        controller: C,
    ) -> Self {
        Self {
            fs,
            path: path.into(),
            matcher,
            line_limit,
            service: service.into(),
            controller,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Read the file and derive the role, without touching the service.
    pub fn read_role(&self) -> Result<Role> {
        let reader = self
            .fs
            .open_read(&self.path)
            .map_err(|e| MonitorError::from_read(&self.path, e))?;
        let line = read_first_line(reader, self.line_limit)
            .map_err(|e| MonitorError::from_read(&self.path, e))?;
        Ok(self.matcher.role_of(&line))
    }

    /// Full reconciliation: read the role, then enable or disable the service.
    ///
    /// The service call is issued on every success, not only on a role change,
    /// so that the periodic path repairs state changed behind our back.
    /// Failures of the service command itself are logged and absorbed. Read
    /// failures are returned; the caller decides how loudly to report them.
    pub async fn reconcile(&self) -> Result<Role> {
        let role = match self.read_role() {
            Ok(role) => role,
            Err(err) => {
                debug!(path = ?self.path, error = %err, "failed to read role");
                return Err(err);
            }
        };

        let result = if role.is_master() {
            info!(service = %self.service, "enabling {}...", self.service);
            self.controller.enable(&self.service).await
        } else {
            info!(service = %self.service, "disabling {}...", self.service);
            self.controller.disable(&self.service).await
        };

        if let Err(err) = result {
            error!(service = %self.service, %role, error = %err, "service command failed");
        }

        info!(%role, path = ?self.path, "reconciled");
        Ok(role)
    }
}
