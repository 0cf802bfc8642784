use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use linstor_monitord::backend::{
    EventMask, NotificationBackend, ReadFuture, ReadOutcome, WatchEvent, WatchHandle,
};
use linstor_monitord::fs::FileSystem;
use linstor_monitord::fs::mock::MockFileSystem;

/// Calls the state machine made on the backend, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Add(PathBuf, EventMask),
    Remove(WatchHandle),
}

type Action = Box<dyn FnOnce(&FakeBackend) + Send>;

enum Step {
    Act(Action),
    Interrupted,
    Fail(io::ErrorKind),
}

#[derive(Debug, Clone)]
struct ActiveWatch {
    handle: WatchHandle,
    path: PathBuf,
    interest: EventMask,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    active: Vec<ActiveWatch>,
    /// Handles the "kernel" already dropped (after a delete-self).
    dropped: HashSet<WatchHandle>,
    pending: Vec<WatchEvent>,
    script: VecDeque<Step>,
    add_failures: VecDeque<(PathBuf, io::ErrorKind)>,
    calls: Vec<BackendCall>,
    reads: usize,
    max_active: usize,
}

/// Scriptable stand-in for a notification backend.
///
/// It sits on top of a [`MockFileSystem`] and behaves like inotify would for
/// the watches currently registered: the `create_file` / `delete_file` /
/// `move_file` / ... helpers change the mock filesystem *and* queue the events
/// the kernel would report. Queued events are returned as one batch by the
/// next `read_events`, which mirrors the kernel coalescing everything that
/// happened since the last read.
///
/// Each `read_events` first runs the next scripted step (if any), then
/// returns the pending batch, or sleeps for the full timeout and reports
/// `TimedOut` when nothing is pending.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// event loop owns another.
#[derive(Clone, Default)]
pub struct FakeBackend {
    fs: MockFileSystem,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeBackend")
            .field("active", &self.lock().active)
            .finish_non_exhaustive()
    }
}

impl FakeBackend {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            })),
        }
    }

    pub fn fs(&self) -> &MockFileSystem {
        &self.fs
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    // ---- scripting ---------------------------------------------------------

    /// Run `action` at the start of a future `read_events` call.
    pub fn then(&self, action: impl FnOnce(&FakeBackend) + Send + 'static) {
        self.lock().script.push_back(Step::Act(Box::new(action)));
    }

    /// Make a future `read_events` call report an interrupted wait.
    pub fn then_interrupt(&self) {
        self.lock().script.push_back(Step::Interrupted);
    }

    /// Make a future `read_events` call fail with `kind`.
    pub fn then_fail(&self, kind: io::ErrorKind) {
        self.lock().script.push_back(Step::Fail(kind));
    }

    /// Make the next `add_watch` on `path` fail with `kind`.
    pub fn fail_next_add(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.lock().add_failures.push_back((path.into(), kind));
    }

    /// Queue a raw event as-is.
    pub fn push_event(&self, event: WatchEvent) {
        self.lock().pending.push(event);
    }

    pub fn push_overflow(&self) {
        self.push_event(WatchEvent::overflow());
    }

    // ---- simulated filesystem activity -----------------------------------

    /// Create (or truncate and rewrite) a file.
    pub fn create_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = path.as_ref();
        let existed = self.fs.is_file(path);
        self.fs.add_file(path, content.as_bytes());

        if existed {
            self.emit_self(path, EventMask::MODIFY);
            self.emit_child(path, EventMask::MODIFY);
        } else {
            self.emit_child(path, EventMask::CREATE);
        }
    }

    /// Rewrite an existing file in place.
    pub fn write_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = path.as_ref();
        self.fs.add_file(path, content.as_bytes());
        self.emit_self(path, EventMask::MODIFY);
        self.emit_child(path, EventMask::MODIFY);
    }

    pub fn delete_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !self.fs.remove(path) {
            return;
        }
        self.emit_self(path, EventMask::DELETE_SELF);
        self.kernel_drop(path);
        self.emit_child(path, EventMask::DELETE);
    }

    /// Rename a file, possibly across directories.
    pub fn move_file(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) {
        let (from, to) = (from.as_ref(), to.as_ref());
        if self.fs.rename(from, to).is_err() {
            return;
        }
        self.emit_self(from, EventMask::MOVE_SELF);
        self.emit_child(from, EventMask::MOVED_FROM);
        self.emit_child(to, EventMask::MOVED_TO);
    }

    /// Remove a directory and everything below it.
    pub fn remove_dir(&self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        let watched: Vec<PathBuf> = self
            .lock()
            .active
            .iter()
            .filter(|w| w.path.starts_with(dir))
            .map(|w| w.path.clone())
            .collect();

        if !self.fs.remove(dir) {
            return;
        }
        for path in watched {
            self.emit_self(&path, EventMask::DELETE_SELF);
            self.kernel_drop(&path);
        }
    }

    fn emit_self(&self, path: &Path, mask: EventMask) {
        let mut inner = self.lock();
        let events: Vec<WatchEvent> = inner
            .active
            .iter()
            .filter(|w| w.path == path && !inner.dropped.contains(&w.handle))
            .filter_map(|w| {
                let mask = mask & (w.interest | EventMask::UNSOLICITED);
                (!mask.is_empty()).then(|| WatchEvent::on_self(w.handle, mask))
            })
            .collect();
        inner.pending.extend(events);
    }

    fn emit_child(&self, path: &Path, mask: EventMask) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        let mut inner = self.lock();
        let events: Vec<WatchEvent> = inner
            .active
            .iter()
            .filter(|w| w.path == parent && !inner.dropped.contains(&w.handle))
            .filter_map(|w| {
                let mask = mask & (w.interest | EventMask::UNSOLICITED);
                (!mask.is_empty()).then(|| WatchEvent::on_child(w.handle, name, mask))
            })
            .collect();
        inner.pending.extend(events);
    }

    /// The kernel drops a watch whose object is gone and reports `IGNORED`.
    fn kernel_drop(&self, path: &Path) {
        let mut inner = self.lock();
        let handles: Vec<WatchHandle> = inner
            .active
            .iter()
            .filter(|w| w.path == path && !inner.dropped.contains(&w.handle))
            .map(|w| w.handle)
            .collect();
        for handle in handles {
            inner.dropped.insert(handle);
            inner
                .pending
                .push(WatchEvent::on_self(handle, EventMask::IGNORED));
        }
    }

    // ---- inspection --------------------------------------------------------

    /// Paths with a live registration (not yet removed by the state machine).
    pub fn active_paths(&self) -> Vec<PathBuf> {
        self.lock().active.iter().map(|w| w.path.clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn handle_for(&self, path: impl AsRef<Path>) -> Option<WatchHandle> {
        self.lock()
            .active
            .iter()
            .find(|w| w.path == path.as_ref())
            .map(|w| w.handle)
    }

    pub fn interest_for(&self, path: impl AsRef<Path>) -> Option<EventMask> {
        self.lock()
            .active
            .iter()
            .find(|w| w.path == path.as_ref())
            .map(|w| w.interest)
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Number of `read_events` calls so far.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Highest number of simultaneously registered watches seen.
    pub fn max_active(&self) -> usize {
        self.lock().max_active
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }
}

impl NotificationBackend for FakeBackend {
    fn add_watch(&mut self, path: &Path, interest: EventMask) -> io::Result<WatchHandle> {
        let mut inner = self.lock();
        inner.calls.push(BackendCall::Add(path.to_path_buf(), interest));

        if let Some(pos) = inner.add_failures.iter().position(|(p, _)| p == path) {
            if let Some((_, kind)) = inner.add_failures.remove(pos) {
                return Err(io::Error::from(kind));
            }
        }
        if !self.fs.exists(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ));
        }

        let handle = WatchHandle::new(inner.next_id);
        inner.next_id += 1;
        inner.active.push(ActiveWatch {
            handle,
            path: path.to_path_buf(),
            interest,
        });
        inner.max_active = inner.max_active.max(inner.active.len());
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        let mut inner = self.lock();
        inner.calls.push(BackendCall::Remove(handle));

        let Some(pos) = inner.active.iter().position(|w| w.handle == handle) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown watch"));
        };
        inner.active.remove(pos);

        if inner.dropped.remove(&handle) {
            // Like inotify_rm_watch on a descriptor the kernel already dropped.
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "watch already dropped"));
        }
        Ok(())
    }

    fn read_events(&mut self, timeout: Duration) -> ReadFuture<'_> {
        let this = self.clone();
        Box::pin(async move {
            let step = {
                let mut inner = this.lock();
                inner.reads += 1;
                inner.script.pop_front()
            };

            match step {
                Some(Step::Act(action)) => action(&this),
                Some(Step::Interrupted) => return Ok(ReadOutcome::Interrupted),
                Some(Step::Fail(kind)) => return Err(io::Error::from(kind)),
                None => {}
            }

            let batch: Vec<WatchEvent> = std::mem::take(&mut this.lock().pending);
            if !batch.is_empty() {
                return Ok(ReadOutcome::Events(batch));
            }

            tokio::time::sleep(timeout).await;
            Ok(ReadOutcome::TimedOut)
        })
    }
}
