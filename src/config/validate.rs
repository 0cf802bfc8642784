// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::engine::WatchTarget;
use crate::errors::{MonitorError, Result};
use crate::reconcile::RoleMatcher;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::MonitorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let matcher = RoleMatcher::new(&raw.watch.marker)?;
        Ok(ConfigFile::new_unchecked(raw, matcher))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watch(cfg)?;
    validate_service(cfg)?;
    validate_backend(cfg)?;
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    let watch = &cfg.watch;

    if !watch.path.is_absolute() {
        return Err(MonitorError::ConfigError(format!(
            "[watch].path must be absolute (got {:?})",
            watch.path
        )));
    }
    WatchTarget::new(&watch.path)?;

    if watch.interval_ms == 0 {
        return Err(MonitorError::ConfigError(
            "[watch].interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    // The marker itself is checked when the matcher is built.
    if watch.line_limit <= watch.marker.len() {
        return Err(MonitorError::ConfigError(format!(
            "[watch].line_limit must be larger than the marker ({} <= {})",
            watch.line_limit,
            watch.marker.len()
        )));
    }

    Ok(())
}

fn validate_service(cfg: &RawConfigFile) -> Result<()> {
    if cfg.service.name.trim().is_empty() {
        return Err(MonitorError::ConfigError(
            "[service].name must not be empty".to_string(),
        ));
    }
    if cfg.service.program.trim().is_empty() {
        return Err(MonitorError::ConfigError(
            "[service].program must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_backend(cfg: &RawConfigFile) -> Result<()> {
    if cfg.backend.poll_interval_ms == 0 {
        return Err(MonitorError::ConfigError(
            "[backend].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
