// src/engine/core.rs

//! Pure classification of an event batch.
//!
//! Given the current [`WatchState`] and a raw batch, decide what the batch
//! means for the state machine. No IO happens here; the manager acts on the
//! returned [`Verdict`].
//!
//! - While awaiting creation, the directory watch reports events for every
//!   child, so only events naming the target file count. Events without a
//!   name concern the directory itself, and its removal is unrecoverable.
//! - While watching the file, all flags in the batch are folded together and
//!   "the file is gone" wins over "the file was modified".

use std::ffi::OsStr;

use crate::backend::{EventMask, WatchEvent};
use crate::engine::{Mode, WatchState};

/// What the manager should do with a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing relevant to the target file.
    Idle,
    /// The watched file's content may have changed.
    Reconcile,
    /// The watched file was deleted, moved away or unmounted.
    FileGone,
    /// The target file may now exist in the watched directory.
    FileAppeared,
    /// The watched directory itself was removed, moved or unmounted.
    DirectoryGone,
}

/// Classification result plus the folded mask (for logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub verdict: Verdict,
    pub mask: EventMask,
    pub overflowed: bool,
}

pub fn summarize_batch(state: &WatchState, file_name: &OsStr, batch: &[WatchEvent]) -> BatchSummary {
    let overflowed = batch
        .iter()
        .any(|ev| ev.mask.contains(EventMask::Q_OVERFLOW));

    match state.mode {
        Mode::AwaitingFileCreation => summarize_directory(state, file_name, batch, overflowed),
        Mode::WatchingFile => summarize_file(state, batch, overflowed),
    }
}

fn summarize_directory(
    state: &WatchState,
    file_name: &OsStr,
    batch: &[WatchEvent],
    overflowed: bool,
) -> BatchSummary {
    let mut mask = EventMask::empty();

    for ev in batch {
        if ev.handle.is_none() || ev.handle != state.dir_watch {
            continue;
        }
        match &ev.name {
            Some(name) if name.as_os_str() == file_name => mask |= ev.mask,
            Some(_) => {}
            None if ev.mask.intersects(EventMask::GONE) => {
                return BatchSummary {
                    verdict: Verdict::DirectoryGone,
                    mask: ev.mask,
                    overflowed,
                };
            }
            None => {}
        }
    }

    // A lost CREATE is indistinguishable from an overflow; look again.
    let verdict = if mask.intersects(EventMask::APPEARED) || overflowed {
        Verdict::FileAppeared
    } else {
        Verdict::Idle
    };

    BatchSummary {
        verdict,
        mask,
        overflowed,
    }
}

fn summarize_file(state: &WatchState, batch: &[WatchEvent], overflowed: bool) -> BatchSummary {
    let mask = batch
        .iter()
        .filter(|ev| ev.handle.is_some() && ev.handle == state.file_watch)
        .fold(EventMask::empty(), |acc, ev| acc | ev.mask);

    let verdict = if mask.intersects(EventMask::GONE) {
        Verdict::FileGone
    } else if mask.contains(EventMask::MODIFY) {
        Verdict::Reconcile
    } else {
        Verdict::Idle
    };

    BatchSummary {
        verdict,
        mask,
        overflowed,
    }
}
