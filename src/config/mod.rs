// src/config/mod.rs

//! Configuration loading and validation for linstor-monitord.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate paths, intervals and the role marker (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{BackendSection, ConfigFile, RawConfigFile, ServiceSection, WatchSection};
