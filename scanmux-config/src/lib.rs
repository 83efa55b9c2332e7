//! Shared configuration library for scanmux.
//!
//! This crate centralizes config loading (file, inline JSON or defaults),
//! guard-rail validation of the scheduling knobs, and `tracing` subscriber
//! setup, so every binary embedding the scan service agrees on defaults and
//! validation rules.

pub mod logging;
pub mod models;
pub mod validation;

pub use logging::init_tracing;
pub use models::service::{ScanServiceConfig, ScanServiceConfigSource};
pub use validation::{ConfigGuardRailError, validate};
