use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use linstor_monitord::errors::MonitorError;
use linstor_monitord::service::{NodeHook, ServiceController, ServiceFuture};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Enable(String),
    Disable(String),
}

/// A service controller that records every verb instead of running anything.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingController {
    calls: Arc<Mutex<Vec<ServiceCall>>>,
    failing: bool,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records calls but reports every one of them as failed.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<ServiceCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: ServiceCall) -> ServiceFuture<'static> {
        self.calls.lock().unwrap().push(call);
        let failing = self.failing;
        Box::pin(async move {
            if failing {
                Err(MonitorError::Other(anyhow::anyhow!("service command failed")))
            } else {
                Ok(())
            }
        })
    }
}

impl ServiceController for RecordingController {
    fn enable<'a>(&'a self, service: &'a str) -> ServiceFuture<'a> {
        self.record(ServiceCall::Enable(service.to_string()))
    }

    fn disable<'a>(&'a self, service: &'a str) -> ServiceFuture<'a> {
        self.record(ServiceCall::Disable(service.to_string()))
    }
}

/// Node hook that only counts its invocations.
#[derive(Debug, Clone, Default)]
pub struct CountingHook {
    count: Arc<AtomicUsize>,
}

impl CountingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl NodeHook for CountingHook {
    fn update(&mut self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A tracing layer that counts `ERROR` events.
///
/// Install it with [`ErrorCounter::install`]; it stays the thread's default
/// subscriber until the returned guard is dropped.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounter {
    errors: Arc<AtomicUsize>,
}

impl ErrorCounter {
    pub fn install() -> (Self, DefaultGuard) {
        let counter = Self::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        (counter, tracing::subscriber::set_default(subscriber))
    }

    pub fn count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }
}
