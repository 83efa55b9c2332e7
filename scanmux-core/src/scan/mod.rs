//! Scan scheduling modules.
//!
//! The scan subsystem pulls together the client registry, the three per-mode
//! schedulers, the cross-radio tracker and the message/timer plumbing that
//! serializes their inputs. [`ScanCore`] owns all of it; [`runtime`] drives a
//! core from a tokio task.

pub mod background;
pub mod channels;
pub mod clock;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod events;
pub mod message;
pub mod pno;
pub mod registry;
pub mod runtime;
pub mod single;
pub mod snapshot;
pub mod timers;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key surfaces so downstream code can write `crate::scan::*`.
pub use background::{BackgroundScanScheduler, BackgroundScanState};
pub use channels::{ChannelCollection, ChannelPlan};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    BackgroundScanConfig, PnoConfig, ScanCoreConfig, SingleScanConfig,
};
pub use self::core::{CoreBackends, ScanCore};
pub use engine::{
    EngineEvent, EngineEventSink, EngineSet, EngineSource, OperationId,
    ScanFailure, ScanStatus, ScannerEngine, ScannerEngineFactory,
};
pub use events::{
    NoopActivityPublisher, ScanActivityEvent, ScanActivityPublisher,
};
pub use message::{EngineMessage, Message};
pub use pno::{PnoScanScheduler, PnoScanState};
pub use registry::{LivenessGuard, LivenessWatcher, NoopLiveness};
pub use single::{SingleScanScheduler, SingleScanState};
pub use snapshot::{ClientSnapshot, ServiceSnapshot};
pub use timers::{AlarmSpec, ManualTimerBackend, TimerBackend, TimerFired, TimerKey};
