// tests/role_derivation.rs

mod common;
use crate::common::{disable, enable, init_tracing, POOL_CONF};

use std::io::Cursor;

use linstor_monitord::errors::{ErrorClass, MonitorError};
use linstor_monitord::fs::mock::MockFileSystem;
use linstor_monitord::reconcile::{read_first_line, Role, RoleMatcher};
use linstor_monitord_test_utils::{reconciler, RecordingController};
use proptest::prelude::*;

fn matcher() -> RoleMatcher {
    RoleMatcher::new("master").unwrap()
}

#[test]
fn marker_must_sit_on_a_word_boundary() {
    let m = matcher();
    assert_eq!(m.role_of(b"master\n"), Role::Master);
    assert_eq!(m.role_of(b"master"), Role::Master);
    assert_eq!(m.role_of(b"master slave\n"), Role::Master);
    assert_eq!(m.role_of(b"master\t\n"), Role::Master);
    assert_eq!(m.role_of(b"master\r\n"), Role::Master);
    assert_eq!(m.role_of(b"master\x0b"), Role::Master);

    assert_eq!(m.role_of(b"mastered\n"), Role::Standby);
    assert_eq!(m.role_of(b"master:10.0.0.1\n"), Role::Standby);
    assert_eq!(m.role_of(b"slave\n"), Role::Standby);
    assert_eq!(m.role_of(b"slave:master\n"), Role::Standby);
    assert_eq!(m.role_of(b" master\n"), Role::Standby);
    assert_eq!(m.role_of(b"Master\n"), Role::Standby);
    assert_eq!(m.role_of(b""), Role::Standby);
}

#[test]
fn nul_after_marker_ends_the_token() {
    let m = matcher();
    assert_eq!(m.role_of(b"master\0"), Role::Master);
    assert_eq!(m.role_of(b"master\0ed\n"), Role::Master);
    assert_eq!(m.role_of(b"\0master\n"), Role::Standby);
}

#[test]
fn marker_with_regex_metacharacters_is_literal() {
    let m = RoleMatcher::new("pri.mary").unwrap();
    assert_eq!(m.role_of(b"pri.mary\n"), Role::Master);
    assert_eq!(m.role_of(b"priXmary\n"), Role::Standby);
}

#[test]
fn invalid_markers_are_rejected() {
    for bad in ["", "two words", "tab\there"] {
        match RoleMatcher::new(bad) {
            Err(MonitorError::ConfigError(msg)) => assert!(msg.contains("role marker")),
            other => panic!("expected ConfigError for {bad:?}, got {other:?}"),
        }
    }
}

#[test]
fn first_line_is_bounded() {
    let line = read_first_line(Cursor::new(b"master\nslave\n".to_vec()), 512).unwrap();
    assert_eq!(line, b"master\n");

    let long = "m".repeat(2000);
    let line = read_first_line(Cursor::new(long.into_bytes()), 512).unwrap();
    assert_eq!(line.len(), 512);

    let err = read_first_line(Cursor::new(Vec::new()), 512).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn truncated_marker_does_not_match() {
    // Only "mast" fits in the buffer.
    let line = read_first_line(Cursor::new(b"master\n".to_vec()), 4).unwrap();
    assert_eq!(matcher().role_of(&line), Role::Standby);
}

#[tokio::test]
async fn master_content_enables_the_service() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(POOL_CONF, "master\n");
    let controller = RecordingController::new();

    let role = reconciler(&fs, controller.clone()).reconcile().await.unwrap();

    assert_eq!(role, Role::Master);
    assert_eq!(controller.calls(), vec![enable()]);
}

#[tokio::test]
async fn other_content_disables_the_service() {
    init_tracing();
    for content in ["slave\n", "mastered\n", "slave:192.168.0.1\n"] {
        let fs = MockFileSystem::new();
        fs.add_file(POOL_CONF, content);
        let controller = RecordingController::new();

        let role = reconciler(&fs, controller.clone()).reconcile().await.unwrap();

        assert_eq!(role, Role::Standby, "content {content:?}");
        assert_eq!(controller.calls(), vec![disable()], "content {content:?}");
    }
}

#[tokio::test]
async fn missing_file_is_not_found_and_touches_nothing() {
    init_tracing();
    let fs = MockFileSystem::new();
    let controller = RecordingController::new();

    let err = reconciler(&fs, controller.clone()).reconcile().await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::NotFound);
    assert!(!err.is_fatal());
    assert!(controller.calls().is_empty());
}

#[tokio::test]
async fn empty_file_is_an_io_error() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(POOL_CONF, "");
    let controller = RecordingController::new();

    let err = reconciler(&fs, controller.clone()).reconcile().await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Io);
    assert!(controller.calls().is_empty());
}

#[test]
fn directory_in_place_of_the_file_is_an_io_error() {
    let fs = MockFileSystem::new();
    fs.add_dir(POOL_CONF);

    let err = reconciler(&fs, RecordingController::new())
        .read_role()
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::Io);
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(POOL_CONF, "master\n");
    let controller = RecordingController::new();
    let reconciler = reconciler(&fs, controller.clone());

    let first = reconciler.reconcile().await.unwrap();
    let second = reconciler.reconcile().await.unwrap();

    assert_eq!(first, second);
    // The verb is issued every time, not only when the role changes.
    assert_eq!(controller.calls(), vec![enable(), enable()]);
}

#[tokio::test]
async fn service_failures_are_absorbed() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(POOL_CONF, "master\n");
    let controller = RecordingController::failing();

    let role = reconciler(&fs, controller.clone()).reconcile().await.unwrap();

    assert_eq!(role, Role::Master);
    assert_eq!(controller.count(), 1);
}

proptest! {
    #[test]
    fn marker_followed_by_a_separator_is_master(
        sep in prop::sample::select(vec![b' ', b'\t', b'\n', b'\x0b', b'\x0c', b'\r', b'\0']),
        rest in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut line = b"master".to_vec();
        line.push(sep);
        line.extend(rest);
        prop_assert_eq!(matcher().role_of(&line), Role::Master);
    }

    #[test]
    fn marker_glued_to_a_token_is_standby(
        glued in "[A-Za-z0-9_:.=-]{1,16}",
        rest in "[ -~]{0,32}",
    ) {
        let line = format!("master{glued}{rest}");
        prop_assert_eq!(matcher().role_of(line.as_bytes()), Role::Standby);
    }

    #[test]
    fn lines_not_starting_with_the_marker_are_standby(line in "[^m][ -~]{0,64}") {
        prop_assert_eq!(matcher().role_of(line.as_bytes()), Role::Standby);
    }
}
