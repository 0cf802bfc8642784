// src/backend/inotify.rs

//! Native Linux backend built on the kernel's inotify facility.
//!
//! The inotify descriptor is non-blocking; waiting is done by registering it
//! with tokio's reactor through [`AsyncFd`], which gives us a bounded wait
//! without a dedicated thread.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::Duration;

use ::inotify::{EventMask as RawEventMask, Inotify, WatchDescriptor, WatchMask};
use tokio::io::unix::AsyncFd;
use tracing::{debug, trace};

use super::{EventMask, NotificationBackend, ReadFuture, ReadOutcome, WatchEvent, WatchHandle};
use crate::errors::{MonitorError, Result};

/// Enough room for a burst of events on a single directory.
const EVENT_BUFFER_SIZE: usize = 16 * 1024;

pub struct InotifyBackend {
    fd: AsyncFd<Inotify>,
    buffer: Vec<u8>,
    watches: Vec<(WatchHandle, WatchDescriptor)>,
    next_id: u64,
}

impl std::fmt::Debug for InotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InotifyBackend")
            .field("watches", &self.watches.len())
            .finish_non_exhaustive()
    }
}

impl InotifyBackend {
    /// Create the process-wide inotify instance.
    ///
    /// Must be called from within a tokio runtime. Any failure is fatal.
    pub fn new() -> Result<Self> {
        let inotify = Inotify::init().map_err(|e| {
            MonitorError::Fatal(format!("unable to create inotify instance: {e}"))
        })?;
        let fd = AsyncFd::new(inotify).map_err(|e| {
            MonitorError::Fatal(format!("unable to register inotify descriptor: {e}"))
        })?;

        debug!("inotify instance created");

        Ok(Self {
            fd,
            buffer: vec![0; EVENT_BUFFER_SIZE],
            watches: Vec::new(),
            next_id: 1,
        })
    }

    fn handle_of(&self, wd: &WatchDescriptor) -> Option<WatchHandle> {
        self.watches
            .iter()
            .find(|(_, known)| known == wd)
            .map(|(handle, _)| *handle)
    }
}

impl NotificationBackend for InotifyBackend {
    fn add_watch(&mut self, path: &Path, interest: EventMask) -> io::Result<WatchHandle> {
        let wd = self
            .fd
            .get_ref()
            .watches()
            .add(path, to_watch_mask(interest))?;

        // The kernel hands out the same descriptor for the same inode.
        if let Some(existing) = self.handle_of(&wd) {
            return Ok(existing);
        }

        let handle = WatchHandle::new(self.next_id);
        self.next_id += 1;
        self.watches.push((handle, wd));
        trace!(%handle, ?path, "inotify watch added");
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        let Some(index) = self.watches.iter().position(|(h, _)| *h == handle) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown watch handle {handle}"),
            ));
        };
        let (_, wd) = self.watches.swap_remove(index);
        self.fd.get_ref().watches().remove(wd)
    }

    fn read_events(&mut self, timeout: Duration) -> ReadFuture<'_> {
        Box::pin(async move {
            let mut guard = match tokio::time::timeout(timeout, self.fd.readable_mut()).await {
                Err(_elapsed) => return Ok(ReadOutcome::TimedOut),
                Ok(ready) => ready?,
            };

            let buffer = &mut self.buffer;
            let watches = &self.watches;

            let read = guard.try_io(|inner| {
                let events = inner.get_mut().read_events(buffer)?;
                let batch: Vec<WatchEvent> = events
                    .filter_map(|event| translate(watches, &event.wd, event.mask, event.name))
                    .collect();
                Ok(batch)
            });

            match read {
                // Readiness was stale; nothing to read yet.
                Err(_would_block) => Ok(ReadOutcome::Interrupted),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {
                    Ok(ReadOutcome::Interrupted)
                }
                Ok(Err(e)) => Err(e),
                // Everything read belonged to descriptors we already dropped.
                Ok(Ok(batch)) if batch.is_empty() => Ok(ReadOutcome::Interrupted),
                Ok(Ok(batch)) => Ok(ReadOutcome::Events(batch)),
            }
        })
    }
}

fn translate(
    watches: &[(WatchHandle, WatchDescriptor)],
    wd: &WatchDescriptor,
    raw: RawEventMask,
    name: Option<&OsStr>,
) -> Option<WatchEvent> {
    let mask = from_event_mask(raw);

    if raw.contains(RawEventMask::Q_OVERFLOW) {
        return Some(WatchEvent::overflow());
    }

    let Some(handle) = watches.iter().find(|(_, known)| known == wd).map(|(h, _)| *h) else {
        trace!(?raw, "dropping event for a retired watch descriptor");
        return None;
    };

    Some(WatchEvent {
        handle: Some(handle),
        mask,
        name: name.map(OsStr::to_os_string),
    })
}

fn to_watch_mask(interest: EventMask) -> WatchMask {
    let mut mask = WatchMask::empty();
    if interest.contains(EventMask::MODIFY) {
        mask |= WatchMask::MODIFY;
    }
    if interest.contains(EventMask::CREATE) {
        mask |= WatchMask::CREATE;
    }
    if interest.contains(EventMask::DELETE) {
        mask |= WatchMask::DELETE;
    }
    if interest.contains(EventMask::MOVED_FROM) {
        mask |= WatchMask::MOVED_FROM;
    }
    if interest.contains(EventMask::MOVED_TO) {
        mask |= WatchMask::MOVED_TO;
    }
    if interest.contains(EventMask::DELETE_SELF) {
        mask |= WatchMask::DELETE_SELF;
    }
    if interest.contains(EventMask::MOVE_SELF) {
        mask |= WatchMask::MOVE_SELF;
    }
    mask
}

fn from_event_mask(raw: RawEventMask) -> EventMask {
    const PAIRS: [(RawEventMask, EventMask); 10] = [
        (RawEventMask::MODIFY, EventMask::MODIFY),
        (RawEventMask::CREATE, EventMask::CREATE),
        (RawEventMask::DELETE, EventMask::DELETE),
        (RawEventMask::MOVED_FROM, EventMask::MOVED_FROM),
        (RawEventMask::MOVED_TO, EventMask::MOVED_TO),
        (RawEventMask::DELETE_SELF, EventMask::DELETE_SELF),
        (RawEventMask::MOVE_SELF, EventMask::MOVE_SELF),
        (RawEventMask::UNMOUNT, EventMask::UNMOUNT),
        (RawEventMask::IGNORED, EventMask::IGNORED),
        (RawEventMask::Q_OVERFLOW, EventMask::Q_OVERFLOW),
    ];

    PAIRS
        .iter()
        .filter(|(raw_flag, _)| raw.contains(*raw_flag))
        .fold(EventMask::empty(), |acc, (_, flag)| acc | *flag)
}
