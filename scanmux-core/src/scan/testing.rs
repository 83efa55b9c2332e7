//! Test doubles shared by the scheduler unit tests.

use std::sync::{Arc, Mutex};

use scanmux_model::{
    ClientEvent, ClientId, ClientIdentity, IfaceName, NativePnoSettings,
    NativeScanSettings, ScanCapabilities, ScanData,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::clock::ManualClock;
use super::config::ScanCoreConfig;
use super::context::CoreContext;
use super::engine::{
    EngineEventSink, EngineSet, EngineSource, OperationId, ScannerEngine,
};
use super::events::{ScanActivityEvent, ScanActivityPublisher};
use super::message::{EngineMessage, Message};
use super::registry::{NoopLiveness, Registry};
use super::timers::{AlarmSpec, TimerBackend, TimerFired, TimerKey, Timers};

#[derive(Default)]
struct FakeEngineState {
    reject_starts: bool,
    hw_pno_supported: bool,
    capabilities: Option<ScanCapabilities>,
    single_results: Option<ScanData>,
    batched_results: Vec<ScanData>,
    single_scans: Vec<(NativeScanSettings, EngineEventSink)>,
    batched_starts: Vec<(NativeScanSettings, EngineEventSink)>,
    batched_stops: usize,
    pno_lists: Vec<(NativePnoSettings, EngineEventSink)>,
    pno_resets: usize,
}

/// Engine that records every call and lets the test script its answers.
pub struct FakeEngine {
    iface: IfaceName,
    state: Mutex<FakeEngineState>,
}

impl std::fmt::Debug for FakeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeEngine")
            .field("iface", &self.iface)
            .finish()
    }
}

impl FakeEngine {
    pub fn new(iface: &str) -> Arc<Self> {
        Arc::new(Self {
            iface: IfaceName::from(iface),
            state: Mutex::new(FakeEngineState {
                capabilities: Some(ScanCapabilities {
                    max_buckets: 8,
                    max_ap_per_scan: 32,
                }),
                ..FakeEngineState::default()
            }),
        })
    }

    pub fn set_of(engines: &[&Arc<FakeEngine>]) -> EngineSet {
        EngineSet::from_engines(
            engines
                .iter()
                .map(|engine| Arc::clone(engine) as Arc<dyn ScannerEngine>)
                .collect(),
        )
    }

    /// Sink whose receiving side is already gone.
    pub fn detached_sink() -> EngineEventSink {
        let (tx, _rx) = mpsc::unbounded_channel();
        EngineEventSink::new(
            IfaceName::from("detached"),
            EngineSource::Single,
            OperationId(0),
            tx,
        )
    }

    pub fn reject_starts(&self, reject: bool) {
        self.state.lock().unwrap().reject_starts = reject;
    }

    pub fn set_hw_pno_supported(&self, supported: bool) {
        self.state.lock().unwrap().hw_pno_supported = supported;
    }

    pub fn set_capabilities(&self, capabilities: Option<ScanCapabilities>) {
        self.state.lock().unwrap().capabilities = capabilities;
    }

    pub fn set_single_results(&self, data: ScanData) {
        self.state.lock().unwrap().single_results = Some(data);
    }

    pub fn set_batched_results(&self, data: Vec<ScanData>) {
        self.state.lock().unwrap().batched_results = data;
    }

    pub fn single_scans(&self) -> Vec<NativeScanSettings> {
        let state = self.state.lock().unwrap();
        state.single_scans.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn last_single_sink(&self) -> EngineEventSink {
        let state = self.state.lock().unwrap();
        state.single_scans.last().expect("no single scan issued").1.clone()
    }

    pub fn batched_starts(&self) -> Vec<NativeScanSettings> {
        let state = self.state.lock().unwrap();
        state.batched_starts.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn last_batched_sink(&self) -> EngineEventSink {
        let state = self.state.lock().unwrap();
        state.batched_starts.last().expect("no batched scan issued").1.clone()
    }

    pub fn batched_stops(&self) -> usize {
        self.state.lock().unwrap().batched_stops
    }

    pub fn pno_lists(&self) -> Vec<NativePnoSettings> {
        let state = self.state.lock().unwrap();
        state.pno_lists.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn last_pno_sink(&self) -> EngineEventSink {
        let state = self.state.lock().unwrap();
        state.pno_lists.last().expect("no pno list set").1.clone()
    }

    pub fn pno_resets(&self) -> usize {
        self.state.lock().unwrap().pno_resets
    }
}

impl ScannerEngine for FakeEngine {
    fn iface_name(&self) -> &IfaceName {
        &self.iface
    }

    fn scan_capabilities(&self) -> Option<ScanCapabilities> {
        self.state.lock().unwrap().capabilities
    }

    fn start_single_scan(
        &self,
        settings: &NativeScanSettings,
        events: EngineEventSink,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_starts {
            return false;
        }
        state.single_scans.push((settings.clone(), events));
        true
    }

    fn latest_single_scan_results(&self) -> Option<ScanData> {
        self.state.lock().unwrap().single_results.clone()
    }

    fn start_batched_scan(
        &self,
        settings: &NativeScanSettings,
        events: EngineEventSink,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_starts {
            return false;
        }
        state.batched_starts.push((settings.clone(), events));
        true
    }

    fn stop_batched_scan(&self) {
        self.state.lock().unwrap().batched_stops += 1;
    }

    fn latest_batched_scan_results(&self, flush: bool) -> Vec<ScanData> {
        let mut state = self.state.lock().unwrap();
        if flush {
            std::mem::take(&mut state.batched_results)
        } else {
            state.batched_results.clone()
        }
    }

    fn set_hw_pno_list(
        &self,
        settings: &NativePnoSettings,
        events: EngineEventSink,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.reject_starts {
            return false;
        }
        state.pno_lists.push((settings.clone(), events));
        true
    }

    fn reset_hw_pno_list(&self) -> bool {
        self.state.lock().unwrap().pno_resets += 1;
        true
    }

    fn is_hw_pno_supported(&self, _is_connected: bool) -> bool {
        self.state.lock().unwrap().hw_pno_supported
    }
}

/// Timer backend that remembers what was armed so tests can fire it.
#[derive(Clone, Default)]
pub struct RecordingTimers {
    armed: Arc<Mutex<Vec<(TimerFired, AlarmSpec)>>>,
}

impl std::fmt::Debug for RecordingTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingTimers").finish()
    }
}

impl RecordingTimers {
    /// Most recent arming of `key`.
    pub fn last(&self, key: TimerKey) -> Option<(TimerFired, AlarmSpec)> {
        self.armed
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(fired, _)| fired.key == key)
            .copied()
    }

    pub fn count(&self, key: TimerKey) -> usize {
        self.armed
            .lock()
            .unwrap()
            .iter()
            .filter(|(fired, _)| fired.key == key)
            .count()
    }
}

impl TimerBackend for RecordingTimers {
    fn arm(&mut self, fired: TimerFired, spec: AlarmSpec) {
        self.armed.lock().unwrap().push((fired, spec));
    }

    fn disarm(&mut self, _key: TimerKey) {}
}

pub fn identity() -> ClientIdentity {
    ClientIdentity::new(10_001, "com.example.app")
}

/// Everything currently queued on a client's result channel.
pub fn drain(events: &mut UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Publisher that keeps every activity event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ScanActivityEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<ScanActivityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ScanActivityPublisher for RecordingPublisher {
    fn publish(&self, event: ScanActivityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A `CoreContext` wired to fakes, for driving one scheduler directly.
pub struct TestHarness {
    pub ctx: CoreContext,
    pub inbox: UnboundedReceiver<Message>,
    pub timers: RecordingTimers,
    pub clock: Arc<ManualClock>,
    pub activity: Arc<RecordingPublisher>,
}

impl TestHarness {
    pub fn new(engines: &[&Arc<FakeEngine>]) -> Self {
        Self::with_config(engines, ScanCoreConfig::default())
    }

    pub fn with_config(engines: &[&Arc<FakeEngine>], config: ScanCoreConfig) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let timers = RecordingTimers::default();
        let clock = Arc::new(ManualClock::new(0));
        let activity = Arc::new(RecordingPublisher::default());
        let mut ctx = CoreContext::new(
            Registry::new(tx.clone(), Box::new(NoopLiveness)),
            Timers::new(Box::new(timers.clone())),
            clock.clone(),
            config,
            activity.clone(),
            tx,
        );
        ctx.engines = FakeEngine::set_of(engines);
        Self {
            ctx,
            inbox,
            timers,
            clock,
            activity,
        }
    }

    /// Registers an external client and returns its result channel.
    pub fn client(&mut self) -> (ClientId, UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .ctx
            .registry
            .register(identity(), tx)
            .expect("register test client");
        (id, rx)
    }

    /// Feeds queued engine events to `handle` and returns every other
    /// message that was queued.
    pub fn pump(
        &mut self,
        mut handle: impl FnMut(&mut CoreContext, EngineMessage),
    ) -> Vec<Message> {
        let mut others = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                Message::Engine(engine) => handle(&mut self.ctx, engine),
                other => others.push(other),
            }
        }
        others
    }
}
