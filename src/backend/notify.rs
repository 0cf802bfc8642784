// src/backend/notify.rs

//! Portable backend on top of the `notify` crate.
//!
//! notify reports changes as path-based [`Event`]s from its own thread. We
//! forward them into the async world over an unbounded channel and translate
//! each one into the inotify-shaped [`EventMask`] vocabulary, relative to the
//! watches we registered:
//!
//! - an event whose path *is* a watched path concerns the watched object
//!   itself (`name == None`);
//! - an event whose parent is a watched path concerns a child of a watched
//!   directory (`name == Some(file_name)`).
//!
//! The same type drives notify's polling watcher, which is the fallback for
//! filesystems that do not deliver change notifications.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::notify::event::{MetadataKind, ModifyKind, RenameMode};
use ::notify::{
    Config, ErrorKind, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{EventMask, NotificationBackend, ReadFuture, ReadOutcome, WatchEvent, WatchHandle};
use crate::errors::{MonitorError, Result};

#[derive(Debug, Clone)]
struct Registration {
    handle: WatchHandle,
    path: PathBuf,
    interest: EventMask,
}

pub struct NotifyBackend<W: Watcher> {
    watcher: W,
    event_rx: mpsc::UnboundedReceiver<::notify::Result<Event>>,
    registrations: Vec<Registration>,
    next_id: u64,
}

impl<W: Watcher> std::fmt::Debug for NotifyBackend<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("registrations", &self.registrations)
            .finish_non_exhaustive()
    }
}

impl NotifyBackend<RecommendedWatcher> {
    /// Backend using the platform's recommended notification API.
    pub fn recommended() -> Result<Self> {
        Self::with_config(Config::default())
    }
}

impl NotifyBackend<PollWatcher> {
    /// Backend that rescans the watched paths every `interval`.
    pub fn polling(interval: Duration) -> Result<Self> {
        Self::with_config(Config::default().with_poll_interval(interval))
    }
}

impl<W: Watcher> NotifyBackend<W> {
    pub fn with_config(config: Config) -> Result<Self> {
        // Channel from the notify callback thread into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = W::new(
            move |res: ::notify::Result<Event>| {
                // The receiver only goes away when the backend is dropped.
                let _ = event_tx.send(res);
            },
            config,
        )
        .map_err(|e| MonitorError::Fatal(format!("unable to create notify watcher: {e}")))?;

        debug!("notify watcher created");

        Ok(Self {
            watcher,
            event_rx,
            registrations: Vec::new(),
            next_id: 1,
        })
    }

    fn translate(&self, event: &Event) -> Vec<WatchEvent> {
        let mut out = Vec::new();

        if event.need_rescan() {
            out.push(WatchEvent::overflow());
        }

        for (index, path) in event.paths.iter().enumerate() {
            for reg in &self.registrations {
                let on_self = path == &reg.path;
                let on_child = !on_self && path.parent() == Some(reg.path.as_path());
                if !on_self && !on_child {
                    continue;
                }

                let mask = classify(&event.kind, index, on_self, path)
                    & (reg.interest | EventMask::UNSOLICITED);
                if mask.is_empty() {
                    continue;
                }

                let name = if on_self {
                    None
                } else {
                    path.file_name().map(|n| n.to_os_string())
                };
                out.push(WatchEvent {
                    handle: Some(reg.handle),
                    mask,
                    name,
                });
            }
        }

        out
    }
}

/// Map one path of a notify event onto the inotify vocabulary.
///
/// `index` matters for `RenameMode::Both`, where `paths[0]` is the source and
/// `paths[1]` the destination.
fn classify(kind: &EventKind, index: usize, on_self: bool, path: &Path) -> EventMask {
    let moved_out = if on_self {
        EventMask::MOVE_SELF
    } else {
        EventMask::MOVED_FROM
    };

    match kind {
        EventKind::Create(_) => EventMask::CREATE,
        EventKind::Remove(_) if on_self => EventMask::DELETE_SELF,
        EventKind::Remove(_) => EventMask::DELETE,
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => moved_out,
            RenameMode::To => EventMask::MOVED_TO,
            RenameMode::Both if index == 0 => moved_out,
            RenameMode::Both => EventMask::MOVED_TO,
            // Direction unknown: decide from what is on disk now.
            _ if path.exists() && !on_self => EventMask::MOVED_TO,
            _ => moved_out,
        },
        // The polling watcher reports a rewrite as a new mtime.
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime | MetadataKind::Any)) => {
            EventMask::MODIFY
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => EventMask::empty(),
        EventKind::Modify(_) => EventMask::MODIFY,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => EventMask::empty(),
    }
}

fn to_io_error(err: ::notify::Error) -> io::Error {
    match err.kind {
        ErrorKind::Io(e) => e,
        ErrorKind::PathNotFound => io::Error::new(io::ErrorKind::NotFound, "path not found"),
        ErrorKind::WatchNotFound => io::Error::new(io::ErrorKind::NotFound, "watch not found"),
        other => io::Error::other(format!("{other:?}")),
    }
}

impl<W: Watcher + Send> NotificationBackend for NotifyBackend<W> {
    fn add_watch(&mut self, path: &Path, interest: EventMask) -> io::Result<WatchHandle> {
        // Some notify watchers accept paths that do not exist yet; keep the
        // NotFound contract explicit.
        std::fs::metadata(path)?;

        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(to_io_error)?;

        let handle = WatchHandle::new(self.next_id);
        self.next_id += 1;
        self.registrations.push(Registration {
            handle,
            path: path.to_path_buf(),
            interest,
        });
        trace!(%handle, ?path, "notify watch added");
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        let Some(index) = self.registrations.iter().position(|r| r.handle == handle) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown watch handle {handle}"),
            ));
        };
        let reg = self.registrations.swap_remove(index);
        self.watcher.unwatch(&reg.path).map_err(to_io_error)
    }

    fn read_events(&mut self, timeout: Duration) -> ReadFuture<'_> {
        Box::pin(async move {
            let first = match tokio::time::timeout(timeout, self.event_rx.recv()).await {
                Err(_elapsed) => return Ok(ReadOutcome::TimedOut),
                Ok(None) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "notify event channel closed",
                    ));
                }
                Ok(Some(res)) => res,
            };

            // Drain whatever else is already queued so one wait yields one batch.
            let mut pending = vec![first];
            while let Ok(res) = self.event_rx.try_recv() {
                pending.push(res);
            }

            let mut batch = Vec::new();
            for res in pending {
                match res {
                    Ok(event) => {
                        trace!(?event, "received notify event");
                        batch.extend(self.translate(&event));
                    }
                    Err(err) => warn!("file watch error: {err}"),
                }
            }

            if batch.is_empty() {
                Ok(ReadOutcome::Interrupted)
            } else {
                Ok(ReadOutcome::Events(batch))
            }
        })
    }
}
