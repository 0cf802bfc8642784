// src/engine/event_loop.rs

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::backend::{Clock, NotificationBackend, ReadOutcome};
use crate::engine::manager::WatchManager;
use crate::engine::Mode;
use crate::errors::{MonitorError, Result};
use crate::reconcile::Reconciler;
use crate::service::{NodeHook, ServiceController};

/// Options for the periodic side of the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    /// Upper bound for every wait, and the period of the node hook.
    pub interval: Duration,
    /// Also reconcile on every periodic tick.
    pub periodic_reconcile: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            periodic_reconcile: true,
        }
    }
}

/// The single blocking wait of the daemon.
///
/// Each turn either fires the periodic tick (when the interval has elapsed)
/// or waits for a notification batch for at most the time left until the
/// next tick. Batches go to the [`WatchManager`]; only fatal errors end the
/// loop.
pub struct EventLoop<B, C, H, K>
where
    B: NotificationBackend,
    C: ServiceController,
    H: NodeHook,
    K: Clock,
{
    backend: B,
    manager: WatchManager,
    reconciler: Reconciler<C>,
    hook: H,
    clock: K,
    options: LoopOptions,
    last_tick: Instant,
}

impl<B, C, H, K> fmt::Debug for EventLoop<B, C, H, K>
where
    B: NotificationBackend,
    C: ServiceController,
    H: NodeHook,
    K: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("manager", &self.manager)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<B, C, H, K> EventLoop<B, C, H, K>
where
    B: NotificationBackend,
    C: ServiceController,
    H: NodeHook,
    K: Clock,
{
    pub fn new(
        backend: B,
        manager: WatchManager,
        reconciler: Reconciler<C>,
        hook: H,
        clock: K,
        options: LoopOptions,
    ) -> Self {
        let last_tick = clock.now();
        Self {
            backend,
            manager,
            reconciler,
            hook,
            clock,
            options,
            last_tick,
        }
    }

    pub fn mode(&self) -> Mode {
        self.manager.mode()
    }

    pub fn manager(&self) -> &WatchManager {
        &self.manager
    }

    /// Node hook, then the initial reconciliation that picks the first mode.
    pub async fn start(&mut self) -> Result<()> {
        self.hook.update();
        self.last_tick = self.clock.now();
        self.manager
            .start(&mut self.backend, &self.reconciler)
            .await
    }

    /// One iteration: periodic tick if due, then one bounded wait.
    pub async fn turn(&mut self) -> Result<()> {
        let elapsed = self.clock.now().saturating_duration_since(self.last_tick);

        let budget = if elapsed >= self.options.interval {
            self.tick().await?;
            self.options.interval
        } else {
            self.options.interval - elapsed
        };

        trace!(?budget, "waiting for notifications");

        match self.backend.read_events(budget).await {
            Ok(ReadOutcome::TimedOut) => Ok(()),
            Ok(ReadOutcome::Interrupted) => Ok(()),
            Ok(ReadOutcome::Events(batch)) => {
                self.manager
                    .handle_batch(batch, &mut self.backend, &self.reconciler)
                    .await
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(err) => {
                error!(error = %err, "Failed to wait for notifications");
                Err(MonitorError::Fatal(format!(
                    "waiting for notifications failed: {err}"
                )))
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        debug!("periodic tick");
        self.hook.update();
        if self.options.periodic_reconcile {
            self.manager
                .on_periodic(&mut self.backend, &self.reconciler)
                .await?;
        }
        self.last_tick = self.clock.now();
        Ok(())
    }

    /// Run until a fatal error.
    ///
    /// Whatever ends the loop, every watch still held is released before the
    /// error is handed back; dropping `self` afterwards closes the backend.
    pub async fn run(mut self) -> Result<()> {
        info!(
            path = ?self.manager.target().file(),
            interval = ?self.options.interval,
            "monitor started"
        );

        let result = self.run_inner().await;

        self.manager.release(&mut self.backend);
        if let Err(err) = &result {
            error!(error = %err, "monitor stopped");
        }
        result
    }

    async fn run_inner(&mut self) -> Result<()> {
        self.start().await?;
        loop {
            self.turn().await?;
        }
    }
}
