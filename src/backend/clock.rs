// src/backend/clock.rs

use tokio::time::Instant;

/// Monotonic time source for the periodic timer.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Production clock backed by tokio's monotonic instant.
///
/// Going through tokio (rather than `std::time::Instant`) lets tests pause
/// and advance time deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
