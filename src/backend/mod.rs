// src/backend/mod.rs

//! Filesystem-change notification backends.
//!
//! The watch state machine only needs three operations from the platform:
//! register interest in a path, drop that interest again, and wait (with a
//! bound) for the next batch of events. Everything platform specific lives
//! behind [`NotificationBackend`]:
//!
//! - [`inotify::InotifyBackend`] talks to the Linux kernel directly and is
//!   the default on Linux.
//! - [`notify::NotifyBackend`] goes through the cross-platform `notify` crate,
//!   either with the recommended OS watcher or with its polling watcher.
//!
//! Events are expressed in one small inotify-shaped vocabulary
//! ([`EventMask`]) regardless of the backend that produced them.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use bitflags::bitflags;

pub mod clock;
#[cfg(target_os = "linux")]
pub mod inotify;
pub mod notify;

pub use clock::{Clock, TokioClock};

bitflags! {
    /// Kinds of filesystem change, named after their inotify counterparts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const MODIFY = 1 << 0;
        const CREATE = 1 << 1;
        const DELETE = 1 << 2;
        const MOVED_FROM = 1 << 3;
        const MOVED_TO = 1 << 4;
        const DELETE_SELF = 1 << 5;
        const MOVE_SELF = 1 << 6;
        const UNMOUNT = 1 << 7;
        const IGNORED = 1 << 8;
        const Q_OVERFLOW = 1 << 9;
    }
}

impl EventMask {
    /// Interest registered on the containing directory while the file is missing.
    pub const DIRECTORY_INTEREST: EventMask = EventMask::CREATE
        .union(EventMask::MOVED_TO)
        .union(EventMask::MOVE_SELF)
        .union(EventMask::DELETE_SELF);

    /// Interest registered on the file itself.
    pub const FILE_INTEREST: EventMask = EventMask::MODIFY
        .union(EventMask::MOVE_SELF)
        .union(EventMask::DELETE_SELF);

    /// The watched object itself went away.
    pub const GONE: EventMask = EventMask::DELETE_SELF
        .union(EventMask::MOVE_SELF)
        .union(EventMask::UNMOUNT);

    /// A child entry showed up in a watched directory.
    pub const APPEARED: EventMask = EventMask::CREATE.union(EventMask::MOVED_TO);

    /// Delivered whether or not they were asked for.
    pub const UNSOLICITED: EventMask = EventMask::UNMOUNT
        .union(EventMask::IGNORED)
        .union(EventMask::Q_OVERFLOW);
}

/// Opaque identifier for one registered (path, interest) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One notification.
///
/// - `handle` is `None` only for queue-level events such as an overflow.
/// - `name` is set when a watched directory reports something about one of
///   its children, and `None` when the event concerns the watched object itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub handle: Option<WatchHandle>,
    pub mask: EventMask,
    pub name: Option<OsString>,
}

impl WatchEvent {
    pub fn on_self(handle: WatchHandle, mask: EventMask) -> Self {
        Self {
            handle: Some(handle),
            mask,
            name: None,
        }
    }

    pub fn on_child(handle: WatchHandle, name: impl Into<OsString>, mask: EventMask) -> Self {
        Self {
            handle: Some(handle),
            mask,
            name: Some(name.into()),
        }
    }

    pub fn overflow() -> Self {
        Self {
            handle: None,
            mask: EventMask::Q_OVERFLOW,
            name: None,
        }
    }
}

/// Result of a single bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// At least one event arrived.
    Events(Vec<WatchEvent>),
    /// The timeout elapsed without any event.
    TimedOut,
    /// The wait was cut short without producing events; wait again.
    Interrupted,
}

/// Boxed future returned by [`NotificationBackend::read_events`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = io::Result<ReadOutcome>> + Send + 'a>>;

/// Capability the watch state machine needs from the platform.
///
/// Production code uses [`inotify::InotifyBackend`] or
/// [`notify::NotifyBackend`]; tests provide a scripted fake.
pub trait NotificationBackend: Send {
    /// Register interest in `path`.
    ///
    /// A missing path must surface as `io::ErrorKind::NotFound`.
    fn add_watch(&mut self, path: &Path, interest: EventMask) -> io::Result<WatchHandle>;

    /// Drop a previously registered watch.
    ///
    /// The handle is forgotten even if the platform reports an error (the
    /// kernel may already have dropped it after a delete-self).
    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()>;

    /// Wait at most `timeout` for the next batch of events.
    fn read_events(&mut self, timeout: Duration) -> ReadFuture<'_>;
}

impl<B: NotificationBackend + ?Sized> NotificationBackend for Box<B> {
    fn add_watch(&mut self, path: &Path, interest: EventMask) -> io::Result<WatchHandle> {
        (**self).add_watch(path, interest)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        (**self).remove_watch(handle)
    }

    fn read_events(&mut self, timeout: Duration) -> ReadFuture<'_> {
        (**self).read_events(timeout)
    }
}
