// src/lib.rs

pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod reconcile;
pub mod service;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{NotificationBackend, TokioClock};
use crate::cli::CliArgs;
use crate::config::{load_or_default, ConfigFile};
use crate::engine::{EventLoop, LoopOptions, WatchManager, WatchTarget};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::reconcile::Reconciler;
use crate::service::{HostnameNodeHook, SystemctlController};
use crate::types::BackendKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file + CLI overrides + validation)
/// - the reconciler and its `systemctl` controller
/// - the notification backend
/// - the event loop
///
/// In watch mode this only returns on a fatal error.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = load_or_default(args.config.as_deref())?;
    args.apply_overrides(&mut raw);
    let cfg = ConfigFile::try_from(raw)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let reconciler = build_reconciler(&cfg, Arc::new(RealFileSystem));

    if args.once {
        let role = reconciler.reconcile().await?;
        info!(%role, "single reconciliation done");
        return Ok(());
    }

    let backend = create_backend(&cfg)?;
    let target = WatchTarget::new(&cfg.watch.path)?;
    let options = LoopOptions {
        interval: cfg.interval(),
        periodic_reconcile: cfg.watch.periodic_reconcile,
    };

    let event_loop = EventLoop::new(
        backend,
        WatchManager::new(target),
        reconciler,
        HostnameNodeHook::new(),
        TokioClock,
        options,
    );
    event_loop.run().await
}

/// Build the production reconciler for a validated config.
pub fn build_reconciler(
    cfg: &ConfigFile,
    fs: Arc<dyn FileSystem>,
) -> Reconciler<SystemctlController> {
    let controller = SystemctlController::new(&cfg.service.program, cfg.service.args.clone());
    Reconciler::new(
        fs,
        cfg.watch.path.clone(),
        cfg.matcher().clone(),
        cfg.watch.line_limit,
        &cfg.service.name,
        controller,
    )
}

/// Create the process-wide notification instance selected by the config.
pub fn create_backend(cfg: &ConfigFile) -> Result<Box<dyn NotificationBackend>> {
    debug!(kind = %cfg.backend.kind, "creating notification backend");

    let backend: Box<dyn NotificationBackend> = match cfg.backend.kind {
        #[cfg(target_os = "linux")]
        BackendKind::Inotify => Box::new(backend::inotify::InotifyBackend::new()?),
        #[cfg(not(target_os = "linux"))]
        BackendKind::Inotify => {
            return Err(crate::errors::MonitorError::ConfigError(
                "the inotify backend is only available on Linux".to_string(),
            ));
        }
        BackendKind::Notify => Box::new(backend::notify::NotifyBackend::recommended()?),
        BackendKind::Poll => Box::new(backend::notify::NotifyBackend::polling(cfg.poll_interval())?),
    };

    Ok(backend)
}

/// Simple dry-run output: print the resolved settings.
fn print_dry_run(cfg: &ConfigFile) {
    println!("linstor-monitord dry-run");
    println!("  watch.path = {}", cfg.watch.path.display());
    println!("  watch.interval_ms = {}", cfg.watch.interval_ms);
    println!("  watch.marker = {:?}", cfg.watch.marker);
    println!("  watch.line_limit = {}", cfg.watch.line_limit);
    println!("  watch.periodic_reconcile = {}", cfg.watch.periodic_reconcile);
    println!("  service.name = {}", cfg.service.name);
    println!(
        "  service.command = {} <enable|disable> {} {}",
        cfg.service.program,
        cfg.service.args.join(" "),
        cfg.service.name
    );
    println!("  backend.kind = {}", cfg.backend.kind);
    if cfg.backend.kind == BackendKind::Poll {
        println!("  backend.poll_interval_ms = {}", cfg.backend.poll_interval_ms);
    }

    let dir = cfg
        .watch
        .path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    if !RealFileSystem.is_dir(&dir) {
        println!("  warning: {} does not exist; the daemon would exit", dir.display());
    }

    debug!("dry-run complete (no service touched)");
}
