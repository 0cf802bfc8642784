// tests/event_loop.rs

mod common;
use crate::common::{disable, enable, init_tracing, Harness, POOL_CONF, POOL_DIR};

use std::io;
use std::time::Duration;

use linstor_monitord::backend::{NotificationBackend, TokioClock};
use linstor_monitord::engine::{EventLoop, LoopOptions, Mode};
use linstor_monitord::errors::ErrorClass;
use linstor_monitord_test_utils::manager;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_secs(2);

#[tokio::test(start_paused = true)]
async fn hook_runs_at_startup_and_once_per_interval() {
    init_tracing();
    let h = Harness::new();
    h.fs.add_file(POOL_CONF, "master\n");
    let mut el = h.event_loop(INTERVAL, true);
    let t0 = Instant::now();

    el.start().await.unwrap();
    assert_eq!(h.hook.count(), 1);

    for _ in 0..5 {
        el.turn().await.unwrap();
    }

    // First turn only waits; each later turn fires a tick first.
    assert_eq!(h.hook.count(), 5);
    let waited = Instant::now() - t0;
    assert!(waited >= INTERVAL * 5 && waited < INTERVAL * 6, "waited {waited:?}");
    assert_eq!(h.controller.count(), 5);
    assert_eq!(el.mode(), Mode::WatchingFile);
}

#[tokio::test(start_paused = true)]
async fn periodic_reconcile_can_be_disabled() {
    init_tracing();
    let h = Harness::new();
    h.fs.add_file(POOL_CONF, "slave\n");
    let mut el = h.event_loop(INTERVAL, false);

    el.start().await.unwrap();
    for _ in 0..4 {
        el.turn().await.unwrap();
    }

    assert_eq!(h.hook.count(), 4);
    assert_eq!(h.controller.calls(), vec![disable()]);
}

#[tokio::test(start_paused = true)]
async fn steady_events_do_not_starve_the_tick() {
    init_tracing();
    let h = Harness::new();
    h.fs.add_file(POOL_CONF, "master\n");
    let backend = h.backend.clone();
    let mut el = h.event_loop(INTERVAL, false);
    el.start().await.unwrap();

    // An event every 500ms, so no wait ever times out.
    for _ in 0..20 {
        backend.write_file(POOL_CONF, "master\n");
        el.turn().await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
    }

    assert_eq!(h.hook.count(), 5);
    assert_eq!(h.controller.count(), 21);
}

#[tokio::test(start_paused = true)]
async fn periodic_tick_promotes_a_silently_created_file() {
    init_tracing();
    let h = Harness::new();
    let mut el = h.event_loop(INTERVAL, true);
    el.start().await.unwrap();
    assert_eq!(el.mode(), Mode::AwaitingFileCreation);

    // Appears without any notification reaching us.
    h.fs.add_file(POOL_CONF, "master\n");
    el.turn().await.unwrap();
    assert_eq!(el.mode(), Mode::AwaitingFileCreation);
    el.turn().await.unwrap();

    assert_eq!(el.mode(), Mode::WatchingFile);
    assert_eq!(h.controller.calls(), vec![enable()]);
}

#[tokio::test(start_paused = true)]
async fn run_follows_the_file_until_the_directory_goes() {
    init_tracing();
    let h = Harness::new();
    let backend = h.backend.clone();
    backend.then(|b| b.create_file(POOL_CONF, "master\n"));
    backend.then(|b| b.write_file(POOL_CONF, "slave\n"));
    backend.then(|b| b.delete_file(POOL_CONF));
    backend.then(|b| b.remove_dir(POOL_DIR));

    let err = h.event_loop(INTERVAL, true).run().await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(h.controller.calls(), vec![enable(), disable()]);
    assert_eq!(h.hook.count(), 1);
    assert_eq!(backend.reads(), 4);
    assert_eq!(backend.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn read_failure_is_fatal_and_releases_watches() {
    init_tracing();
    let h = Harness::new();
    h.fs.add_file(POOL_CONF, "master\n");
    let backend = h.backend.clone();
    backend.then_fail(io::ErrorKind::Other);

    let err = h.event_loop(INTERVAL, true).run().await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Fatal);
    assert_eq!(backend.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn interrupted_waits_are_retried() {
    init_tracing();
    let h = Harness::new();
    let backend = h.backend.clone();
    backend.then_interrupt();
    backend.then_fail(io::ErrorKind::Interrupted);
    backend.then_interrupt();
    backend.then(|b| b.remove_dir(POOL_DIR));

    let err = h.event_loop(INTERVAL, true).run().await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(backend.reads(), 4);
}

#[tokio::test(start_paused = true)]
async fn boxed_backend_drives_the_loop() {
    init_tracing();
    let h = Harness::new();
    h.fs.add_file(POOL_CONF, "master\n");
    let fake = h.backend.clone();
    fake.then(|b| b.write_file(POOL_CONF, "slave\n"));
    fake.then(|b| b.remove_dir(POOL_DIR));

    let backend: Box<dyn NotificationBackend> = Box::new(fake.clone());
    let el = EventLoop::new(
        backend,
        manager(),
        h.reconciler(),
        h.hook.clone(),
        TokioClock,
        LoopOptions {
            interval: INTERVAL,
            periodic_reconcile: true,
        },
    );

    let err = el.run().await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(h.controller.calls(), vec![enable(), disable()]);
    assert_eq!(fake.active_count(), 0);
}
