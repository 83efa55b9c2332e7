use serde::{Deserialize, Serialize};

/// Scanner activity observable outside the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanActivityEvent {
    /// Admin toggle applied.
    ScanningEnabled { enabled: bool },
    /// A merged single scan started or finished.
    SingleScanInProgress { in_progress: bool },
    /// Emergency scan signal. Held for a grace period after the last
    /// emergency scan completes.
    EmergencyScanInProgress { in_progress: bool },
}

pub trait ScanActivityPublisher: Send + Sync {
    fn publish(&self, event: ScanActivityEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivityPublisher;

impl ScanActivityPublisher for NoopActivityPublisher {
    fn publish(&self, _event: ScanActivityEvent) {}
}
