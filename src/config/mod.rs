//! Configuration module for the voice service.
//!
//! Provides CLI argument parsing and voice model discovery.

#[allow(clippy::module_inception)]
mod config;
mod models;

pub use config::{AppConfig, EngineKind};
pub use models::{ModelCatalog, ModelFile};
