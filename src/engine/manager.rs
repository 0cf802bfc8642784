// src/engine/manager.rs

//! Mode transitions of the watch state machine.
//!
//! `AwaitingFileCreation -> WatchingFile` happens when a reconciliation
//! succeeds: the file watch is registered first, then the directory watch is
//! dropped.
//!
//! `WatchingFile -> AwaitingFileCreation` happens when the file watch reports
//! the file gone or a reconciliation fails to read it: the file watch is
//! dropped, the directory watch registered, and a reconciliation is attempted
//! straight away in case the file came back before the directory watch was in
//! place.
//!
//! Each transition runs to completion before the next batch is looked at.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::backend::{EventMask, NotificationBackend, WatchEvent, WatchHandle};
use crate::engine::core::{summarize_batch, Verdict};
use crate::engine::{Mode, WatchState};
use crate::errors::{ErrorClass, MonitorError, Result};
use crate::reconcile::Reconciler;
use crate::service::ServiceController;

/// The single watched path, split into the pieces the watches need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    file: PathBuf,
    dir: PathBuf,
    file_name: OsString,
}

impl WatchTarget {
    pub fn new(file: impl Into<PathBuf>) -> Result<Self> {
        let file = file.into();
        let file_name = file
            .file_name()
            .map(OsStr::to_os_string)
            .ok_or_else(|| {
                MonitorError::ConfigError(format!("{} does not name a file", file.display()))
            })?;
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => {
                return Err(MonitorError::ConfigError(format!(
                    "{} has no parent directory",
                    file.display()
                )));
            }
        };

        Ok(Self {
            file,
            dir,
            file_name,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }
}

/// Owns the [`WatchState`] and performs every transition.
///
/// The backend and reconciler are passed into each operation rather than
/// owned, so the event loop keeps sole ownership of the notification instance.
#[derive(Debug)]
pub struct WatchManager {
    target: WatchTarget,
    state: WatchState,
}

impl WatchManager {
    pub fn new(target: WatchTarget) -> Self {
        Self {
            target,
            state: WatchState::initial(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Decide the initial mode by reconciling once before any watch exists.
    pub async fn start<B, C>(&mut self, backend: &mut B, reconciler: &Reconciler<C>) -> Result<()>
    where
        B: NotificationBackend + ?Sized,
        C: ServiceController,
    {
        info!(path = ?self.target.file, "starting watch");

        match reconciler.reconcile().await {
            Ok(_) => match self.register_file_watch(backend) {
                Ok(handle) => {
                    self.state.file_watch = Some(handle);
                    self.state.mode = Mode::WatchingFile;
                    info!(mode = %self.state.mode, %handle, "watching file");
                    Ok(())
                }
                Err(err) => {
                    error!(error = %err, "cannot watch file after reading it");
                    self.enter_awaiting(backend, reconciler).await
                }
            },
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                error!(path = ?self.target.file, error = %err, "failed to read role");
                self.enter_awaiting(backend, reconciler).await
            }
        }
    }

    /// Classify a batch and act on it. Only fatal conditions are returned.
    pub async fn handle_batch<B, C>(
        &mut self,
        batch: Vec<WatchEvent>,
        backend: &mut B,
        reconciler: &Reconciler<C>,
    ) -> Result<()>
    where
        B: NotificationBackend + ?Sized,
        C: ServiceController,
    {
        let summary = summarize_batch(&self.state, &self.target.file_name, &batch);
        debug!(
            mode = %self.state.mode,
            events = batch.len(),
            mask = ?summary.mask,
            verdict = ?summary.verdict,
            "classified event batch"
        );

        if summary.overflowed {
            warn!("Event queue overflow.");
        }

        match summary.verdict {
            Verdict::Idle => Ok(()),
            Verdict::DirectoryGone => {
                error!(dir = ?self.target.dir, mask = ?summary.mask, "watched directory has been removed");
                Err(MonitorError::Fatal(format!(
                    "watched directory {} has been removed",
                    self.target.dir.display()
                )))
            }
            Verdict::FileAppeared => {
                info!(path = ?self.target.file, mask = ?summary.mask, "watched file may have been recreated");
                self.try_promote(backend, reconciler).await
            }
            Verdict::FileGone => {
                error!(path = ?self.target.file, mask = ?summary.mask, "watched file has been removed");
                self.enter_awaiting(backend, reconciler).await
            }
            Verdict::Reconcile => {
                info!(mask = ?summary.mask, "updating services");
                self.reconcile_watched(backend, reconciler).await
            }
        }
    }

    /// Time-driven reconciliation.
    pub async fn on_periodic<B, C>(&mut self, backend: &mut B, reconciler: &Reconciler<C>) -> Result<()>
    where
        B: NotificationBackend + ?Sized,
        C: ServiceController,
    {
        debug!(mode = %self.state.mode, "periodic reconciliation");
        match self.state.mode {
            Mode::WatchingFile => self.reconcile_watched(backend, reconciler).await,
            Mode::AwaitingFileCreation => self.try_promote(backend, reconciler).await,
        }
    }

    /// Drop every handle still held. Called once when the loop ends.
    pub fn release<B>(&mut self, backend: &mut B)
    where
        B: NotificationBackend + ?Sized,
    {
        if let Some(handle) = self.state.file_watch.take() {
            remove_quietly(backend, handle);
        }
        if let Some(handle) = self.state.dir_watch.take() {
            remove_quietly(backend, handle);
        }
        debug!("all watches released");
    }

    async fn reconcile_watched<B, C>(&mut self, backend: &mut B, reconciler: &Reconciler<C>) -> Result<()>
    where
        B: NotificationBackend + ?Sized,
        C: ServiceController,
    {
        match reconciler.reconcile().await {
            Ok(_) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                error!(path = ?self.target.file, error = %err, "failed to read role");
                self.enter_awaiting(backend, reconciler).await
            }
        }
    }

    /// `WatchingFile -> AwaitingFileCreation` (also used for the initial
    /// fall-back when the file cannot be read at startup).
    async fn enter_awaiting<B, C>(&mut self, backend: &mut B, reconciler: &Reconciler<C>) -> Result<()>
    where
        B: NotificationBackend + ?Sized,
        C: ServiceController,
    {
        if let Some(handle) = self.state.file_watch.take() {
            remove_quietly(backend, handle);
        }

        if self.state.dir_watch.is_none() {
            let handle = backend
                .add_watch(&self.target.dir, EventMask::DIRECTORY_INTEREST)
                .map_err(|e| {
                    error!(dir = ?self.target.dir, error = %e, "unable to register directory watch");
                    MonitorError::Fatal(format!(
                        "unable to watch {}: {e}",
                        self.target.dir.display()
                    ))
                })?;
            self.state.dir_watch = Some(handle);
        }

        self.state.mode = Mode::AwaitingFileCreation;
        info!(mode = %self.state.mode, dir = ?self.target.dir, "waiting for file creation");

        // The file may have come back before the directory watch existed.
        self.try_promote(backend, reconciler).await
    }

    /// `AwaitingFileCreation -> WatchingFile` if the file can be read now.
    async fn try_promote<B, C>(&mut self, backend: &mut B, reconciler: &Reconciler<C>) -> Result<()>
    where
        B: NotificationBackend + ?Sized,
        C: ServiceController,
    {
        match reconciler.reconcile().await {
            Ok(_) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(error = %err, "file still unavailable");
                return Ok(());
            }
        }

        let handle = match self.register_file_watch(backend) {
            Ok(handle) => handle,
            Err(err) if err.class() == ErrorClass::NotFound => {
                debug!(error = %err, "file vanished before it could be watched");
                return Ok(());
            }
            Err(err) => {
                error!(error = %err, "unable to register file watch");
                return Ok(());
            }
        };

        self.state.file_watch = Some(handle);
        if let Some(dir_handle) = self.state.dir_watch.take() {
            remove_quietly(backend, dir_handle);
        }
        self.state.mode = Mode::WatchingFile;
        info!(mode = %self.state.mode, %handle, path = ?self.target.file, "file recreated; watching file");
        Ok(())
    }

    fn register_file_watch<B>(&self, backend: &mut B) -> Result<WatchHandle>
    where
        B: NotificationBackend + ?Sized,
    {
        backend
            .add_watch(&self.target.file, EventMask::FILE_INTEREST)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    MonitorError::NotFound(self.target.file.clone())
                } else {
                    MonitorError::Recoverable {
                        path: self.target.file.clone(),
                        source,
                    }
                }
            })
    }
}

/// Removal is best effort: the kernel drops a watch on its own after a
/// delete-self, so a failure here is expected and only logged.
fn remove_quietly<B>(backend: &mut B, handle: WatchHandle)
where
    B: NotificationBackend + ?Sized,
{
    match backend.remove_watch(handle) {
        Ok(()) => debug!(%handle, "watch removed"),
        Err(err) => debug!(%handle, error = %err, "watch already gone"),
    }
}
