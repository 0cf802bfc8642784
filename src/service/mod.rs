// src/service/mod.rs

//! Collaborators the reconciler drives.
//!
//! - [`ServiceController`] turns the managed service on or off. The
//!   production implementation, [`SystemctlController`], shells out to
//!   `systemctl`; tests record calls instead.
//! - [`hook::NodeHook`] is the fire-and-forget per-node update invoked at
//!   startup and on every periodic tick.

use std::future::Future;
use std::pin::Pin;

pub mod hook;
pub mod systemctl;

pub use hook::{HostnameNodeHook, NodeHook};
pub use systemctl::SystemctlController;

use crate::errors::Result;

/// Boxed future returned by [`ServiceController`] verbs.
pub type ServiceFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Two-verb contract for the managed service.
///
/// Both verbs are expected to be idempotent: the reconciler calls one of
/// them on every successful reconciliation, whether or not the role changed.
pub trait ServiceController: Send + Sync {
    fn enable<'a>(&'a self, service: &'a str) -> ServiceFuture<'a>;
    fn disable<'a>(&'a self, service: &'a str) -> ServiceFuture<'a>;
}
