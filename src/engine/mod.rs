// src/engine/mod.rs

//! Watch/reconcile engine.
//!
//! This module ties together:
//! - the two watch modes and the handles they own ([`WatchState`])
//! - the pure classification of an event batch against that state ([`core`])
//! - the transitions between modes, which register and drop watches and run
//!   reconciliations ([`manager`])
//! - the single bounded wait that interleaves notification batches with the
//!   periodic timer ([`event_loop`])
//!
//! Everything runs on one control flow. The only suspension point that can
//! last is the bounded wait inside the event loop.

use std::fmt;

use crate::backend::WatchHandle;

/// Which watch strategy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The file could not be read; the containing directory is watched for
    /// the file to (re)appear.
    AwaitingFileCreation,
    /// The file itself is watched for modification, deletion and moves.
    WatchingFile,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::AwaitingFileCreation => f.write_str("awaiting-file-creation"),
            Mode::WatchingFile => f.write_str("watching-file"),
        }
    }
}

/// The complete mutable state of the watch state machine.
///
/// Outside of a transition, `AwaitingFileCreation` holds exactly a directory
/// handle and `WatchingFile` exactly a file handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchState {
    pub mode: Mode,
    pub dir_watch: Option<WatchHandle>,
    pub file_watch: Option<WatchHandle>,
}

impl WatchState {
    /// State before any watch exists.
    pub fn initial() -> Self {
        Self {
            mode: Mode::AwaitingFileCreation,
            dir_watch: None,
            file_watch: None,
        }
    }
}

pub mod core;
pub mod event_loop;
pub mod manager;

pub use self::core::{summarize_batch, BatchSummary, Verdict};
pub use event_loop::{EventLoop, LoopOptions};
pub use manager::{WatchManager, WatchTarget};
