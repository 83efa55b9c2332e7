//! Contract between the schedulers and the per-radio scan engines.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use scanmux_model::{
    IfaceName, NativePnoSettings, NativeScanSettings, ScanCapabilities,
    ScanData, ScanResult,
};
use tokio::sync::mpsc::UnboundedSender;

use super::message::{EngineMessage, Message};

/// Identifies one issued engine operation so late events from a superseded
/// operation can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Which scheduler an engine event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineSource {
    Single,
    Background,
    Pno,
}

/// Error codes an engine attaches to a failed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanFailure {
    #[default]
    Unknown,
    Busy,
    Aborted,
    NoDevice,
    InvalidArgs,
}

impl ScanFailure {
    pub fn description(&self) -> &'static str {
        match self {
            ScanFailure::Unknown => "Scan failed - unknown",
            ScanFailure::Busy => "Scan failed - Device or resource busy",
            ScanFailure::Aborted => "Scan aborted",
            ScanFailure::NoDevice => "Scan failed - No such device",
            ScanFailure::InvalidArgs => "Scan failed - invalid argument",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    ResultsAvailable,
    ThresholdNumScans,
    ThresholdPercent,
    Failed(ScanFailure),
}

/// Asynchronous notifications an engine delivers after an operation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ScanStatus(ScanStatus),
    FullResult {
        result: ScanResult,
        buckets_scanned: u32,
    },
    /// Batched scanning paused for a higher-priority operation; carries the
    /// partial results gathered so far.
    ScanPaused(Vec<ScanData>),
    ScanRestarted,
    PnoNetworkFound(Vec<ScanResult>),
    PnoScanFailed,
}

/// Handle an engine uses to post events for one operation back into the
/// scheduler's message stream.
#[derive(Clone)]
pub struct EngineEventSink {
    iface: IfaceName,
    source: EngineSource,
    operation: OperationId,
    inbox: UnboundedSender<Message>,
}

impl fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventSink")
            .field("iface", &self.iface)
            .field("source", &self.source)
            .field("operation", &self.operation)
            .field("inbox_closed", &self.inbox.is_closed())
            .finish()
    }
}

impl EngineEventSink {
    pub(crate) fn new(
        iface: IfaceName,
        source: EngineSource,
        operation: OperationId,
        inbox: UnboundedSender<Message>,
    ) -> Self {
        Self {
            iface,
            source,
            operation,
            inbox,
        }
    }

    pub fn iface(&self) -> &IfaceName {
        &self.iface
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    /// Posts an event; silently dropped once the scheduler is gone.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.inbox.send(Message::Engine(EngineMessage {
            iface: self.iface.clone(),
            source: self.source,
            operation: self.operation,
            event,
        }));
    }
}

/// One radio's scan engine. Calls return immediately; results arrive later
/// through the supplied [`EngineEventSink`].
pub trait ScannerEngine: Send + Sync {
    fn iface_name(&self) -> &IfaceName;

    /// Batched scan limits, or `None` when the engine cannot report them.
    fn scan_capabilities(&self) -> Option<ScanCapabilities>;

    fn start_single_scan(
        &self,
        settings: &NativeScanSettings,
        events: EngineEventSink,
    ) -> bool;

    /// Results of the most recent single scan.
    fn latest_single_scan_results(&self) -> Option<ScanData>;

    fn start_batched_scan(
        &self,
        settings: &NativeScanSettings,
        events: EngineEventSink,
    ) -> bool;

    fn stop_batched_scan(&self);

    fn latest_batched_scan_results(&self, flush: bool) -> Vec<ScanData>;

    fn set_hw_pno_list(
        &self,
        settings: &NativePnoSettings,
        events: EngineEventSink,
    ) -> bool;

    fn reset_hw_pno_list(&self) -> bool;

    fn is_hw_pno_supported(&self, is_connected: bool) -> bool;
}

/// Builds the engine set when scanning is enabled.
pub trait ScannerEngineFactory: Send {
    fn create_engines(&mut self) -> Vec<Arc<dyn ScannerEngine>>;
}

impl<F> ScannerEngineFactory for F
where
    F: FnMut() -> Vec<Arc<dyn ScannerEngine>> + Send,
{
    fn create_engines(&mut self) -> Vec<Arc<dyn ScannerEngine>> {
        self()
    }
}

/// Engines currently bound, keyed by interface name.
#[derive(Clone, Default)]
pub struct EngineSet {
    engines: BTreeMap<IfaceName, Arc<dyn ScannerEngine>>,
}

impl fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSet")
            .field("ifaces", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EngineSet {
    pub fn from_engines(engines: Vec<Arc<dyn ScannerEngine>>) -> Self {
        let engines = engines
            .into_iter()
            .map(|engine| (engine.iface_name().clone(), engine))
            .collect();
        Self { engines }
    }

    pub fn get(&self, iface: &IfaceName) -> Option<&Arc<dyn ScannerEngine>> {
        self.engines.get(iface)
    }

    /// First engine in interface order.
    pub fn first(&self) -> Option<&Arc<dyn ScannerEngine>> {
        self.engines.values().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IfaceName, &Arc<dyn ScannerEngine>)> {
        self.engines.iter()
    }

    pub fn ifaces(&self) -> impl Iterator<Item = &IfaceName> {
        self.engines.keys()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
