use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use scanmux_model::{
    ClientEvent, ClientId, ClientIdentity, PnoSettings, ScanResult, ScanSettings,
    WorkSource,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::error::Result;

use super::background::BackgroundScanScheduler;
use super::clock::{Clock, MonotonicClock};
use super::config::ScanCoreConfig;
use super::context::CoreContext;
use super::engine::{EngineSet, EngineSource, ScannerEngineFactory};
use super::events::{NoopActivityPublisher, ScanActivityEvent, ScanActivityPublisher};
use super::message::{EngineMessage, Message};
use super::pno::PnoScanScheduler;
use super::registry::{LivenessWatcher, NoopLiveness, Registry};
use super::single::SingleScanScheduler;
use super::snapshot::{ClientSnapshot, ServiceSnapshot};
use super::timers::{ManualTimerBackend, TimerBackend, TimerKey, Timers};

/// Collaborators a core is wired to.
pub struct CoreBackends {
    pub engines: Box<dyn ScannerEngineFactory>,
    pub liveness: Box<dyn LivenessWatcher>,
    pub timers: Box<dyn TimerBackend>,
    pub clock: Arc<dyn Clock>,
    pub activity: Arc<dyn ScanActivityPublisher>,
}

impl fmt::Debug for CoreBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreBackends").finish_non_exhaustive()
    }
}

impl CoreBackends {
    /// Backends for a core driven by hand: no liveness watch, timers that
    /// never fire on their own, a monotonic clock and no activity listeners.
    pub fn manual(engines: Box<dyn ScannerEngineFactory>) -> Self {
        Self {
            engines,
            liveness: Box::new(NoopLiveness),
            timers: Box::new(ManualTimerBackend),
            clock: Arc::new(MonotonicClock::default()),
            activity: Arc::new(NoopActivityPublisher),
        }
    }
}

/// The scheduling core.
///
/// Every public method and [`ScanCore::dispatch`] runs to completion before
/// the next input is looked at, so the core is owned by a single task.
/// Asynchronous inputs (engine events, timer fires, client deaths and
/// self-posts) are queued on the inbox whose sender is handed to
/// [`ScanCore::new`].
pub struct ScanCore {
    ctx: CoreContext,
    factory: Box<dyn ScannerEngineFactory>,
    scanning_enabled: bool,
    single: SingleScanScheduler,
    background: BackgroundScanScheduler,
    pno: PnoScanScheduler,
}

impl fmt::Debug for ScanCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCore")
            .field("scanning_enabled", &self.scanning_enabled)
            .field("ctx", &self.ctx)
            .field("single", &self.single.state())
            .field("background", &self.background.state())
            .field("pno", &self.pno.state())
            .finish()
    }
}

impl ScanCore {
    pub fn new(
        config: ScanCoreConfig,
        inbox: UnboundedSender<Message>,
        backends: CoreBackends,
    ) -> Self {
        let ctx = CoreContext::new(
            Registry::new(inbox.clone(), backends.liveness),
            Timers::new(backends.timers),
            backends.clock,
            config,
            backends.activity,
            inbox,
        );
        Self {
            ctx,
            factory: backends.engines,
            scanning_enabled: false,
            single: SingleScanScheduler::new(),
            background: BackgroundScanScheduler::new(),
            pno: PnoScanScheduler::new(),
        }
    }

    pub fn is_scanning_enabled(&self) -> bool {
        self.scanning_enabled
    }

    pub fn config(&self) -> &ScanCoreConfig {
        &self.ctx.config
    }

    pub fn single(&self) -> &SingleScanScheduler {
        &self.single
    }

    pub fn background(&self) -> &BackgroundScanScheduler {
        &self.background
    }

    pub fn pno(&self) -> &PnoScanScheduler {
        &self.pno
    }

    pub fn is_registered(&self, client: ClientId) -> bool {
        self.ctx.registry.contains(client)
    }

    pub fn register_client(
        &mut self,
        identity: ClientIdentity,
        channel: UnboundedSender<ClientEvent>,
    ) -> Result<ClientId> {
        self.ctx.registry.register(identity, channel)
    }

    /// Removes the client from every scheduler, then forgets it. Unknown
    /// handles are ignored.
    pub fn unregister_client(&mut self, client: ClientId) {
        if !self.ctx.registry.contains(client) {
            debug!(client = %client, "unregister for unknown client");
            return;
        }
        let ctx = &mut self.ctx;
        self.single.remove_all_for_client(ctx, client);
        self.single.remove_listener(client);
        self.background.remove_all_for_client(ctx, client);
        self.pno.remove_all_for_client(ctx, client);
        self.release_internal_clients();
        self.ctx.registry.remove(client);
        info!(client = %client, "client unregistered");
    }

    pub fn add_scan_listener(&mut self, client: ClientId) {
        if !self.ctx.registry.contains(client) {
            warn!(client = %client, "scan listener from unknown client");
            return;
        }
        self.single.add_listener(client);
    }

    pub fn remove_scan_listener(&mut self, client: ClientId) {
        self.single.remove_listener(client);
    }

    /// Admin toggle. Enabling binds a fresh engine set and starts every
    /// scheduler; disabling interrupts all outstanding work and drops the
    /// engines.
    pub fn set_scanning_enabled(&mut self, enabled: bool) {
        if enabled == self.scanning_enabled {
            debug!(enabled, "scanning already in requested state");
            return;
        }
        if enabled {
            let engines = self.factory.create_engines();
            if engines.is_empty() {
                error!("no scanner engines available; scanning stays disabled");
                return;
            }
            self.ctx.engines = EngineSet::from_engines(engines);
            info!(engines = self.ctx.engines.len(), "scanning enabled");
            self.single.enable(&mut self.ctx);
            self.background.enable(&mut self.ctx);
            self.pno.enable(&mut self.ctx);
        } else {
            info!("scanning disabled");
            self.single.disable(&mut self.ctx);
            self.background.disable(&mut self.ctx);
            self.pno.disable(&mut self.ctx);
            self.release_internal_clients();
            self.ctx.engines = EngineSet::default();
        }
        self.scanning_enabled = enabled;
        self.ctx
            .publish(ScanActivityEvent::ScanningEnabled { enabled });
    }

    pub fn start_single_scan(
        &mut self,
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    ) {
        self.single
            .start_scan(&mut self.ctx, client, settings, work_source);
    }

    pub fn stop_single_scan(&mut self, client: ClientId) {
        self.single.stop_scan(client);
    }

    pub fn start_background_scan(
        &mut self,
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    ) {
        if !self.ctx.registry.contains(client) {
            warn!(client = %client, "background scan from unknown client");
            return;
        }
        self.background
            .start_scan(&mut self.ctx, client, settings, work_source);
    }

    pub fn stop_background_scan(&mut self, client: ClientId) {
        self.background.stop_scan(&mut self.ctx, client);
    }

    pub fn get_batched_results(&mut self, client: ClientId) {
        if !self.ctx.registry.contains(client) {
            warn!(client = %client, "batched results requested by unknown client");
            return;
        }
        self.background.get_batched_results(&mut self.ctx, client);
    }

    pub fn start_pno_scan(
        &mut self,
        client: ClientId,
        settings: ScanSettings,
        pno: PnoSettings,
    ) {
        self.pno.start_scan(&mut self.ctx, client, settings, pno);
        self.release_internal_clients();
    }

    pub fn stop_pno_scan(&mut self, client: ClientId) {
        self.pno.stop_scan(&mut self.ctx, client);
        self.release_internal_clients();
    }

    pub fn cached_scan_results(&self) -> Vec<ScanResult> {
        self.single.cached_scan_results(&self.ctx)
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            taken_at: Utc::now(),
            scanning_enabled: self.scanning_enabled,
            engines: self.ctx.engines.ifaces().map(ToString::to_string).collect(),
            clients: self
                .ctx
                .registry
                .records()
                .map(ClientSnapshot::from)
                .collect(),
            single: self.single.snapshot(&self.ctx),
            background: self.background.snapshot(),
            pno: self.pno.snapshot(),
        }
    }

    /// Processes one queued input.
    pub fn dispatch(&mut self, message: Message) {
        match message {
            Message::Engine(engine) => self.route_engine_event(engine),
            Message::Timer(fired) => {
                if !self.ctx.timers.accept(fired) {
                    debug!(key = ?fired.key, generation = fired.generation, "dropping stale timer");
                    return;
                }
                match fired.key {
                    TimerKey::EmergencyScanEnd => {
                        self.single.handle_emergency_end(&mut self.ctx);
                    }
                    TimerKey::SoftwarePnoScan | TimerKey::SoftwarePnoUpperBound => {
                        self.pno.handle_timer(&mut self.ctx, fired.key);
                    }
                }
            }
            Message::ClientDied(client) => {
                info!(client = %client, "client died");
                self.unregister_client(client);
            }
            Message::InternalClient { client, event } => {
                self.pno.handle_internal_event(&mut self.ctx, client, event);
            }
            Message::InternalSingleScan {
                client,
                settings,
                work_source,
            } => {
                if self.ctx.registry.contains(client) {
                    self.single
                        .start_scan(&mut self.ctx, client, settings, work_source);
                } else {
                    debug!(client = %client, "internal scan for released client dropped");
                }
            }
            Message::StopSoftwarePno { session } => {
                self.pno.handle_software_exhausted(&mut self.ctx, session);
            }
        }
        self.release_internal_clients();
    }

    fn route_engine_event(&mut self, message: EngineMessage) {
        match message.source {
            EngineSource::Single => self.single.handle_engine_event(&mut self.ctx, message),
            EngineSource::Background => {
                self.background.handle_engine_event(&mut self.ctx, message)
            }
            EngineSource::Pno => self.pno.handle_engine_event(&mut self.ctx, message),
        }
    }

    /// Drops single-scan work left behind by internal clients the PNO
    /// scheduler has let go of.
    fn release_internal_clients(&mut self) {
        for client in self.pno.take_released_clients() {
            self.single.remove_all_for_client(&mut self.ctx, client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::background::BackgroundScanState;
    use crate::scan::clock::ManualClock;
    use crate::scan::engine::{EngineEvent, ScanStatus, ScannerEngine};
    use crate::scan::pno::PnoScanState;
    use crate::scan::single::SingleScanState;
    use crate::scan::testing::{self, FakeEngine, RecordingPublisher, RecordingTimers};
    use scanmux_model::{PnoNetwork, ScanData, WifiBand};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct CoreHarness {
        core: ScanCore,
        inbox: UnboundedReceiver<Message>,
        activity: Arc<RecordingPublisher>,
    }

    impl CoreHarness {
        fn new(engines: Vec<Arc<FakeEngine>>) -> Self {
            let (tx, inbox) = mpsc::unbounded_channel();
            let activity = Arc::new(RecordingPublisher::default());
            let factory = move || {
                engines
                    .iter()
                    .map(|engine| Arc::clone(engine) as Arc<dyn ScannerEngine>)
                    .collect::<Vec<_>>()
            };
            let backends = CoreBackends {
                engines: Box::new(factory),
                liveness: Box::new(NoopLiveness),
                timers: Box::new(RecordingTimers::default()),
                clock: Arc::new(ManualClock::new(0)),
                activity: activity.clone(),
            };
            Self {
                core: ScanCore::new(ScanCoreConfig::default(), tx, backends),
                inbox,
                activity,
            }
        }

        fn client(&mut self) -> (ClientId, UnboundedReceiver<ClientEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = self.core.register_client(testing::identity(), tx).unwrap();
            (id, rx)
        }

        fn pump(&mut self) {
            while let Ok(message) = self.inbox.try_recv() {
                self.core.dispatch(message);
            }
        }
    }

    fn pno_settings() -> PnoSettings {
        PnoSettings {
            networks: vec![PnoNetwork::new("home")],
            ..PnoSettings::default()
        }
    }

    #[test]
    fn client_death_cascades_through_every_scheduler() {
        let engine = FakeEngine::new("wlan0");
        engine.set_hw_pno_supported(true);
        let mut h = CoreHarness::new(vec![engine.clone()]);
        h.core.set_scanning_enabled(true);
        let (client, events) = h.client();

        h.core.start_single_scan(
            client,
            ScanSettings::for_band(WifiBand::BAND_BOTH),
            WorkSource::default(),
        );
        let mut background = ScanSettings::for_band(WifiBand::BAND_BOTH);
        background.period_ms = 20_000;
        h.core
            .start_background_scan(client, background.clone(), WorkSource::default());
        h.core.start_pno_scan(client, background, pno_settings());
        assert_eq!(h.core.single().state(), SingleScanState::Scanning);
        assert_eq!(h.core.background().snapshot().requests, 1);
        assert_eq!(h.core.pno().state(), PnoScanState::HwPno);

        drop(events);
        h.core.dispatch(Message::ClientDied(client));

        assert!(!h.core.is_registered(client));
        assert_eq!(h.core.single().state(), SingleScanState::Idle);
        assert_eq!(h.core.background().snapshot().requests, 0);
        assert_eq!(h.core.pno().state(), PnoScanState::Started);
        assert_eq!(engine.pno_resets(), 1);
        assert_eq!(engine.batched_stops(), 1);
        assert!(h.core.snapshot().clients.is_empty());
    }

    #[test]
    fn emergency_scan_waits_for_enable() {
        let engine = FakeEngine::new("wlan0");
        let mut h = CoreHarness::new(vec![engine.clone()]);
        let (client, mut events) = h.client();

        let mut emergency = ScanSettings::for_band(WifiBand::BAND_BOTH);
        emergency.ignore_location_settings = true;
        h.core
            .start_single_scan(client, emergency, WorkSource::from_uid(1000));
        assert_eq!(testing::drain(&mut events), vec![ClientEvent::Success]);
        assert!(engine.single_scans().is_empty());

        h.core.set_scanning_enabled(true);
        assert_eq!(engine.single_scans().len(), 1);
        assert_eq!(h.core.single().state(), SingleScanState::Scanning);
        assert!(h.activity.events().contains(&ScanActivityEvent::ScanningEnabled {
            enabled: true
        }));
    }

    #[test]
    fn pno_match_is_confirmed_by_single_scan() {
        let engine = FakeEngine::new("wlan0");
        engine.set_hw_pno_supported(true);
        let mut h = CoreHarness::new(vec![engine.clone()]);
        h.core.set_scanning_enabled(true);
        let (client, mut events) = h.client();

        h.core
            .start_pno_scan(client, ScanSettings::for_band(WifiBand::BAND_BOTH), pno_settings());
        assert_eq!(testing::drain(&mut events), vec![ClientEvent::Success]);

        engine.last_pno_sink().emit(EngineEvent::PnoNetworkFound(vec![
            ScanResult::new("home", "00:01", 2412, 1),
            ScanResult::new("home", "00:02", 5180, 1),
        ]));
        h.pump();
        assert_eq!(engine.single_scans().len(), 1);
        assert!(testing::drain(&mut events).is_empty());

        let confirmed = ScanResult::new("home", "00:01", 2412, 2);
        engine.set_single_results(ScanData::new(WifiBand::BAND_BOTH, vec![confirmed.clone()]));
        engine
            .last_single_sink()
            .emit(EngineEvent::ScanStatus(ScanStatus::ResultsAvailable));
        h.pump();

        assert_eq!(
            testing::drain(&mut events),
            vec![ClientEvent::PnoNetworkFound {
                results: vec![confirmed]
            }]
        );
        assert_eq!(h.core.pno().state(), PnoScanState::HwPno);
    }

    #[test]
    fn disabling_interrupts_and_releases_internal_work() {
        let engine = FakeEngine::new("wlan0");
        engine.set_hw_pno_supported(true);
        let mut h = CoreHarness::new(vec![engine.clone()]);
        h.core.set_scanning_enabled(true);
        let (client, mut events) = h.client();
        h.core
            .start_pno_scan(client, ScanSettings::for_band(WifiBand::BAND_BOTH), pno_settings());
        engine
            .last_pno_sink()
            .emit(EngineEvent::PnoNetworkFound(vec![ScanResult::new("home", "00:01", 2412, 1)]));
        h.pump();
        assert_eq!(h.core.pno().state(), PnoScanState::HwPnoSingleScan);
        testing::drain(&mut events);

        h.core.set_scanning_enabled(false);
        h.pump();

        assert_eq!(h.core.single().state(), SingleScanState::Default);
        assert_eq!(h.core.background().state(), BackgroundScanState::Default);
        assert_eq!(h.core.pno().state(), PnoScanState::Default);
        assert_eq!(
            testing::drain(&mut events),
            vec![ClientEvent::failure(
                scanmux_model::FailureReason::Unspecified,
                crate::scan::single::INTERRUPTED
            )]
        );
        let snapshot = h.core.snapshot();
        assert_eq!(snapshot.clients.len(), 1);
        assert!(snapshot.engines.is_empty());
    }

    #[test]
    fn snapshot_serializes() {
        let engine = FakeEngine::new("wlan0");
        let mut h = CoreHarness::new(vec![engine]);
        h.core.set_scanning_enabled(true);
        let (_client, _events) = h.client();

        let json = h.core.snapshot().to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["scanning_enabled"], true);
        assert_eq!(value["engines"][0], "wlan0");
        assert_eq!(value["single"]["state"], "idle");
        assert_eq!(value["clients"][0]["package_name"], "com.example.app");
    }
}
