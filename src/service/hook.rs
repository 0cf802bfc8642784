// src/service/hook.rs

use tracing::{debug, error};

/// Per-node update invoked once at startup and once per periodic interval.
///
/// Fire-and-forget: the event loop never looks at an outcome.
pub trait NodeHook: Send {
    fn update(&mut self);
}

/// Resolves the local hostname on every update and remembers the last one.
///
/// Registration of the node with the cluster controller is not performed
/// here; the hook only keeps track of the identity it would register under.
#[derive(Debug, Clone, Default)]
pub struct HostnameNodeHook {
    last_hostname: Option<String>,
}

impl HostnameNodeHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_hostname(&self) -> Option<&str> {
        self.last_hostname.as_deref()
    }
}

impl NodeHook for HostnameNodeHook {
    fn update(&mut self) {
        match hostname::get() {
            Ok(name) => {
                let name = name.to_string_lossy().into_owned();
                if self.last_hostname.as_deref() != Some(name.as_str()) {
                    debug!(hostname = %name, "node identity");
                    self.last_hostname = Some(name);
                }
            }
            Err(err) => error!("Failed to get hostname: `{err}`."),
        }
    }
}
