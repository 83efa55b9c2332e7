//! Tokio wiring for [`ScanCore`](crate::scan::ScanCore).
//!
//! One task owns the core and multiplexes caller requests with the core's
//! inbox, so every input is processed one at a time in arrival order.

pub mod event_bus;
pub mod liveness;
pub mod service;
pub mod timers;

pub use event_bus::InProcScanEventBus;
pub use liveness::TokioLivenessWatch;
pub use service::{ScanService, ServiceOptions};
pub use timers::TokioTimerBackend;
