use std::collections::BTreeMap;

use scanmux_model::{IfaceName, ScanData};
use tracing::{debug, warn};

use super::engine::{EngineSet, OperationId, ScanFailure, ScannerEngine};

/// Status of one engine for the operation being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Pending,
    Succeeded,
    Failed(ScanFailure),
}

impl EngineStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineStatus::Pending)
    }
}

/// Fans one logical operation out to every engine and folds the per-engine
/// outcomes into a single verdict.
///
/// The verdict is `Pending` while any engine is pending, `Succeeded` when at
/// least one engine succeeded, and `Failed` only when every engine failed.
/// A terminal verdict is produced at most once per operation.
#[derive(Debug, Default)]
pub struct ImplsTracker {
    operation: Option<OperationId>,
    statuses: BTreeMap<IfaceName, EngineStatus>,
    last_failure: Option<ScanFailure>,
    concluded: bool,
}

impl ImplsTracker {
    /// Issues the operation to every engine through `issue`. Engines that
    /// reject immediately are not tracked. Returns true when at least one
    /// engine accepted.
    pub fn start<F>(
        &mut self,
        operation: OperationId,
        engines: &EngineSet,
        mut issue: F,
    ) -> bool
    where
        F: FnMut(&IfaceName, &dyn ScannerEngine) -> bool,
    {
        self.clear();
        self.operation = Some(operation);
        for (iface, engine) in engines.iter() {
            if issue(iface, engine.as_ref()) {
                self.statuses.insert(iface.clone(), EngineStatus::Pending);
            } else {
                warn!(iface = %iface, %operation, "engine rejected operation");
            }
        }
        !self.statuses.is_empty()
    }

    pub fn clear(&mut self) {
        self.operation = None;
        self.statuses.clear();
        self.last_failure = None;
        self.concluded = false;
    }

    pub fn operation(&self) -> Option<OperationId> {
        self.operation
    }

    pub fn is_current(&self, operation: OperationId) -> bool {
        self.operation == Some(operation)
    }

    /// Whether events from `iface` should still be forwarded.
    pub fn is_pending(&self, iface: &IfaceName) -> bool {
        matches!(self.statuses.get(iface), Some(EngineStatus::Pending))
    }

    pub fn tracked_ifaces(&self) -> impl Iterator<Item = &IfaceName> {
        self.statuses.keys()
    }

    /// Records a new status for `iface`. Updates are accepted only from
    /// `Pending`. Returns the consolidated verdict the first time it becomes
    /// terminal.
    pub fn report(
        &mut self,
        iface: &IfaceName,
        status: EngineStatus,
    ) -> Option<EngineStatus> {
        if self.concluded {
            return None;
        }
        match self.statuses.get_mut(iface) {
            Some(current @ EngineStatus::Pending) => *current = status,
            _ => {
                debug!(iface = %iface, ?status, "ignoring status for non-pending engine");
                return None;
            }
        }
        if let EngineStatus::Failed(failure) = status {
            self.last_failure = Some(failure);
        }

        let verdict = self.consolidated();
        if verdict.is_terminal() {
            self.concluded = true;
            Some(verdict)
        } else {
            None
        }
    }

    pub fn consolidated(&self) -> EngineStatus {
        let statuses = || self.statuses.values();
        if statuses().any(|s| *s == EngineStatus::Pending) {
            EngineStatus::Pending
        } else if statuses().any(|s| *s == EngineStatus::Succeeded) {
            EngineStatus::Succeeded
        } else {
            EngineStatus::Failed(self.last_failure.unwrap_or_default())
        }
    }

    /// Merges the latest single-scan results of every succeeded engine. The
    /// first engine seeds the pass; later engines append their results.
    pub fn merged_single_scan_results(&self, engines: &EngineSet) -> Option<ScanData> {
        let mut merged: Option<ScanData> = None;
        for (iface, status) in &self.statuses {
            if *status != EngineStatus::Succeeded {
                continue;
            }
            let Some(engine) = engines.get(iface) else {
                continue;
            };
            let Some(latest) = engine.latest_single_scan_results() else {
                warn!(iface = %iface, "succeeded engine returned no results");
                continue;
            };
            match merged.as_mut() {
                None => merged = Some(latest),
                Some(data) => {
                    data.scanned_bands |= latest.scanned_bands;
                    data.results.extend(latest.results);
                }
            }
        }
        merged
    }
}
