#![allow(dead_code)]

use std::time::Duration;

use linstor_monitord::backend::{NotificationBackend, ReadOutcome};
use linstor_monitord::engine::WatchManager;
use linstor_monitord::errors::Result;
use linstor_monitord::reconcile::Reconciler;
pub use linstor_monitord_test_utils::{
    init_tracing, FakeBackend, Harness, RecordingController, ServiceCall, POOL_CONF, POOL_DIR,
    SERVICE,
};

pub fn enable() -> ServiceCall {
    ServiceCall::Enable(SERVICE.to_string())
}

pub fn disable() -> ServiceCall {
    ServiceCall::Disable(SERVICE.to_string())
}

/// Read whatever the fake backend has queued and feed it to the manager.
///
/// Returns `Ok(false)` without touching the manager when nothing was queued.
pub async fn pump(
    manager: &mut WatchManager,
    backend: &mut FakeBackend,
    reconciler: &Reconciler<RecordingController>,
) -> Result<bool> {
    let outcome = backend
        .read_events(Duration::ZERO)
        .await
        .expect("fake backend read");
    match outcome {
        ReadOutcome::Events(batch) => {
            manager.handle_batch(batch, backend, reconciler).await?;
            Ok(true)
        }
        ReadOutcome::TimedOut | ReadOutcome::Interrupted => Ok(false),
    }
}
