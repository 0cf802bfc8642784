pub mod fake_backend;
pub mod recorders;

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

use linstor_monitord::backend::TokioClock;
use linstor_monitord::engine::{EventLoop, LoopOptions, WatchManager, WatchTarget};
use linstor_monitord::fs::mock::MockFileSystem;
use linstor_monitord::reconcile::{Reconciler, RoleMatcher};
use tracing_subscriber::{fmt, EnvFilter};

pub use fake_backend::{BackendCall, FakeBackend};
pub use recorders::{CountingHook, ErrorCounter, RecordingController, ServiceCall};

/// Directory and file used by most scenarios.
pub const POOL_DIR: &str = "/etc/xensource";
pub const POOL_CONF: &str = "/etc/xensource/pool.conf";
pub const SERVICE: &str = "linstor-controller";

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Reconciler over `fs` for [`POOL_CONF`] with the stock marker and limits.
pub fn reconciler(fs: &MockFileSystem, controller: RecordingController) -> Reconciler<RecordingController> {
    reconciler_for(fs, POOL_CONF, controller)
}

pub fn reconciler_for(
    fs: &MockFileSystem,
    path: impl AsRef<Path>,
    controller: RecordingController,
) -> Reconciler<RecordingController> {
    Reconciler::new(
        Arc::new(fs.clone()),
        path.as_ref(),
        RoleMatcher::new("master").expect("stock marker is valid"),
        512,
        SERVICE,
        controller,
    )
}

pub fn manager() -> WatchManager {
    WatchManager::new(WatchTarget::new(POOL_CONF).expect("stock path is valid"))
}

/// Everything a scenario needs, wired to one mock filesystem.
pub struct Harness {
    pub fs: MockFileSystem,
    pub backend: FakeBackend,
    pub controller: RecordingController,
    pub hook: CountingHook,
}

impl Harness {
    pub fn new() -> Self {
        let fs = MockFileSystem::new();
        fs.add_dir(POOL_DIR);
        Self {
            backend: FakeBackend::new(fs.clone()),
            fs,
            controller: RecordingController::new(),
            hook: CountingHook::new(),
        }
    }

    pub fn reconciler(&self) -> Reconciler<RecordingController> {
        reconciler(&self.fs, self.controller.clone())
    }

    pub fn event_loop(
        &self,
        interval: Duration,
        periodic_reconcile: bool,
    ) -> EventLoop<FakeBackend, RecordingController, CountingHook, TokioClock> {
        EventLoop::new(
            self.backend.clone(),
            manager(),
            self.reconciler(),
            self.hook.clone(),
            TokioClock,
            LoopOptions {
                interval,
                periodic_reconcile,
            },
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
