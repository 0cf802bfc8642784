// tests/stabilization.rs
//
// Random interleavings of filesystem activity against the watch manager.
// Whatever happens to the file, once the dust settles the manager must hold
// exactly the watch its mode calls for, and be watching the file exactly
// when it can be read.

mod common;
use crate::common::{disable, enable, pump, Harness, POOL_CONF, POOL_DIR};

use std::path::{Path, PathBuf};

use linstor_monitord::engine::{Mode, WatchManager};
use linstor_monitord::fs::FileSystem;
use linstor_monitord::reconcile::RoleMatcher;
use linstor_monitord_test_utils::{manager, FakeBackend};
use proptest::prelude::*;

const ASIDE: &str = "/etc/xensource/pool.conf.old";

#[derive(Debug, Clone)]
enum Op {
    Create(&'static str),
    Write(&'static str),
    Delete,
    MoveAway,
    MoveBack,
    Overflow,
    /// Deliver everything queued so far as one batch.
    Flush,
    Periodic,
}

fn content() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["master\n", "slave\n", "master slave\n", "mastered\n", ""])
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => content().prop_map(Op::Create),
        1 => content().prop_map(Op::Write),
        1 => Just(Op::Delete),
        1 => Just(Op::MoveAway),
        1 => Just(Op::MoveBack),
        1 => Just(Op::Overflow),
        3 => Just(Op::Flush),
        1 => Just(Op::Periodic),
    ]
}

fn assert_consistent(m: &WatchManager, backend: &FakeBackend) {
    let state = m.state();
    match state.mode {
        Mode::AwaitingFileCreation => {
            assert!(state.dir_watch.is_some(), "awaiting without a directory watch");
            assert!(state.file_watch.is_none(), "awaiting with a file watch");
            assert_eq!(backend.active_paths(), vec![PathBuf::from(POOL_DIR)]);
        }
        Mode::WatchingFile => {
            assert!(state.file_watch.is_some(), "watching without a file watch");
            assert!(state.dir_watch.is_none(), "watching with a directory watch");
            assert_eq!(backend.active_paths(), vec![PathBuf::from(POOL_CONF)]);
        }
    }
}

/// `Some(is_master)` when the file can be reconciled, `None` otherwise.
fn readable(h: &Harness) -> Option<bool> {
    let text = h.fs.read_to_string(Path::new(POOL_CONF)).ok()?;
    if text.is_empty() {
        return None;
    }
    let matcher = RoleMatcher::new("master").unwrap();
    Some(matcher.role_of(text.as_bytes()).is_master())
}

async fn scenario(initial: Option<&'static str>, ops: Vec<Op>) {
    let h = Harness::new();
    if let Some(text) = initial {
        h.fs.add_file(POOL_CONF, text);
    }
    let mut backend = h.backend.clone();
    let reconciler = h.reconciler();
    let mut m = manager();

    m.start(&mut backend, &reconciler).await.unwrap();
    assert_consistent(&m, &backend);

    for op in ops {
        match op {
            Op::Create(text) => backend.create_file(POOL_CONF, text),
            Op::Write(text) => {
                if h.fs.is_file(Path::new(POOL_CONF)) {
                    backend.write_file(POOL_CONF, text);
                }
            }
            Op::Delete => backend.delete_file(POOL_CONF),
            Op::MoveAway => backend.move_file(POOL_CONF, ASIDE),
            Op::MoveBack => backend.move_file(ASIDE, POOL_CONF),
            Op::Overflow => backend.push_overflow(),
            Op::Flush => {
                pump(&mut m, &mut backend, &reconciler).await.unwrap();
                assert_consistent(&m, &backend);
            }
            Op::Periodic => {
                m.on_periodic(&mut backend, &reconciler).await.unwrap();
                assert_consistent(&m, &backend);
            }
        }
    }

    // Settle: drain what is queued, then let the periodic retry catch up on
    // anything the notifications could not report.
    pump(&mut m, &mut backend, &reconciler).await.unwrap();
    m.on_periodic(&mut backend, &reconciler).await.unwrap();
    assert_consistent(&m, &backend);
    assert!(backend.max_active() <= 2);

    match readable(&h) {
        Some(master) => {
            assert_eq!(m.mode(), Mode::WatchingFile);
            let expected = if master { enable() } else { disable() };
            assert_eq!(h.controller.last(), Some(expected));
        }
        None => assert_eq!(m.mode(), Mode::AwaitingFileCreation),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn manager_settles_into_the_right_mode(
        initial in proptest::option::of(content()),
        ops in proptest::collection::vec(op(), 0..24),
    ) {
        runtime().block_on(scenario(initial, ops));
    }
}
