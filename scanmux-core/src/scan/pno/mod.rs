//! Preferred network offload.
//!
//! One client at a time. When every engine supports offload the network
//! list is pushed to the engines and matches come back as events; a match
//! without information elements is confirmed by a single scan first. When
//! offload is unavailable and the software fallback is enabled, an internal
//! client drives ordinary single scans on a three-phase timer schedule and
//! matches results by SSID.

pub mod schedule;

use std::mem;

use scanmux_model::{
    ClientEvent, ClientId, FailureReason, NativePnoSettings, PnoSettings,
    ReportEvents, ScanData, ScanResult, ScanSettings, WorkSource,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScanError};

use super::context::CoreContext;
use super::engine::{EngineEvent, EngineSource};
use super::message::{EngineMessage, Message};
use super::single::INTERRUPTED;
use super::timers::TimerKey;
use super::tracker::{EngineStatus, ImplsTracker};

pub use schedule::SoftwarePnoSchedule;

const PNO_SCAN_FAILED: &str = "pno scan failed";
const SINGLE_SCAN_FAILED: &str = "single scan failed";
const SW_SCAN_FAILED: &str = "scan failed";
const SW_SCHEDULE_EXHAUSTED: &str = "software PNO schedule exhausted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PnoScanState {
    Default,
    Started,
    HwPno,
    /// Confirming a hardware match with a single scan.
    HwPnoSingleScan,
    SwPno,
}

impl PnoScanState {
    fn has_session(&self) -> bool {
        matches!(
            self,
            PnoScanState::HwPno | PnoScanState::HwPnoSingleScan | PnoScanState::SwPno
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum PnoMode {
    Hardware,
    Software,
}

#[derive(Debug, Clone)]
struct PnoRequest {
    client: ClientId,
    settings: ScanSettings,
    pno: PnoSettings,
}

#[derive(Debug)]
struct SoftwareSession {
    schedule: SoftwarePnoSchedule,
    scan_in_flight: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PnoScanSnapshot {
    pub state: PnoScanState,
    pub client: Option<ClientId>,
    pub networks: usize,
    pub software_phase: Option<usize>,
    pub software_iteration: Option<u32>,
    pub software_scan_in_flight: bool,
}

fn to_native(settings: &ScanSettings, pno: &PnoSettings) -> NativePnoSettings {
    NativePnoSettings {
        period_ms: settings.period_ms,
        is_connected: pno.is_connected,
        min_5ghz_rssi: pno.min_5ghz_rssi,
        min_24ghz_rssi: pno.min_24ghz_rssi,
        min_6ghz_rssi: pno.min_6ghz_rssi,
        scan_iterations: pno.scan_iterations,
        scan_interval_multiplier: pno.scan_interval_multiplier,
        networks: pno.networks.clone(),
    }
}

/// A confirming scan is needed unless some result already carries
/// information elements.
pub fn single_scan_needed(results: &[ScanResult]) -> bool {
    !results.iter().any(ScanResult::has_information_elements)
}

#[derive(Debug)]
pub struct PnoScanScheduler {
    state: PnoScanState,
    request: Option<PnoRequest>,
    internal: Option<ClientId>,
    /// Internal clients released since the core last collected them.
    released: Vec<ClientId>,
    tracker: ImplsTracker,
    software: Option<SoftwareSession>,
    session: u64,
}

impl Default for PnoScanScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PnoScanScheduler {
    pub fn new() -> Self {
        Self {
            state: PnoScanState::Default,
            request: None,
            internal: None,
            released: Vec::new(),
            tracker: ImplsTracker::default(),
            software: None,
            session: 0,
        }
    }

    pub fn state(&self) -> PnoScanState {
        self.state
    }

    pub fn owner(&self) -> Option<ClientId> {
        self.request.as_ref().map(|r| r.client)
    }

    pub fn internal_client(&self) -> Option<ClientId> {
        self.internal
    }

    /// Internal clients whose single scans must be dropped by the caller.
    pub fn take_released_clients(&mut self) -> Vec<ClientId> {
        mem::take(&mut self.released)
    }

    pub fn enable(&mut self, ctx: &mut CoreContext) {
        if self.state != PnoScanState::Default {
            return;
        }
        if ctx.engines.is_empty() {
            error!("cannot start pno scans: no scanner engines bound");
            return;
        }
        debug!("pno scheduler started");
        self.state = PnoScanState::Started;
    }

    pub fn disable(&mut self, ctx: &mut CoreContext) {
        if self.state == PnoScanState::Default {
            return;
        }
        self.leave_session(ctx);
        if let Some(request) = self.request.take() {
            ctx.registry
                .fail(request.client, FailureReason::Unspecified, INTERRUPTED);
        }
        self.state = PnoScanState::Default;
        debug!("pno scheduler stopped");
    }

    pub fn start_scan(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        settings: ScanSettings,
        pno: PnoSettings,
    ) {
        let started = match self.admission_mode(ctx, client, &pno) {
            Ok(PnoMode::Hardware) => self.start_hw(ctx, client, settings, pno),
            Ok(PnoMode::Software) => self.start_sw(ctx, client, settings, pno),
            Err(err) => Err(err),
        };
        if let Err(err) = started {
            warn!(client = %client, owner = ?self.owner(), error = %err, "rejecting pno scan");
            ctx.registry.reject(client, &err);
        }
    }

    fn admission_mode(
        &self,
        ctx: &CoreContext,
        client: ClientId,
        pno: &PnoSettings,
    ) -> Result<PnoMode> {
        if !ctx.registry.contains(client) {
            return Err(ScanError::UnknownClient(client));
        }
        if self.state == PnoScanState::Default {
            return Err(ScanError::NotAvailable("pno scanning is disabled".to_string()));
        }
        if self.state.has_session() {
            return Err(ScanError::DuplicateRequest(
                "a pno scan is already active".to_string(),
            ));
        }
        let hw_supported = !ctx.engines.is_empty()
            && ctx
                .engines
                .iter()
                .all(|(_, engine)| engine.is_hw_pno_supported(pno.is_connected));
        if hw_supported {
            Ok(PnoMode::Hardware)
        } else if ctx.config.pno.software_pno_enabled {
            Ok(PnoMode::Software)
        } else {
            Err(ScanError::NotSupported(
                "no offload on every engine and software pno disabled".to_string(),
            ))
        }
    }

    /// Ends the client's session without a callback.
    pub fn stop_scan(&mut self, ctx: &mut CoreContext, client: ClientId) {
        if self.owner() != Some(client) {
            return;
        }
        info!(client = %client, "pno scan stopped");
        self.leave_session(ctx);
        self.request = None;
    }

    pub fn remove_all_for_client(&mut self, ctx: &mut CoreContext, client: ClientId) {
        self.stop_scan(ctx, client);
    }

    pub fn handle_engine_event(&mut self, ctx: &mut CoreContext, message: EngineMessage) {
        if !matches!(self.state, PnoScanState::HwPno | PnoScanState::HwPnoSingleScan)
            || !self.tracker.is_current(message.operation)
        {
            debug!(iface = %message.iface, operation = %message.operation, "ignoring stale pno event");
            return;
        }
        match message.event {
            EngineEvent::PnoNetworkFound(results) => {
                if !self.tracker.is_pending(&message.iface) {
                    return;
                }
                if self.state == PnoScanState::HwPnoSingleScan {
                    debug!(iface = %message.iface, "pno match while confirming; ignored");
                    return;
                }
                if single_scan_needed(&results) {
                    debug!(iface = %message.iface, count = results.len(), "pno match without IEs, confirming with a single scan");
                    self.request_internal_scan(ctx);
                    self.state = PnoScanState::HwPnoSingleScan;
                } else {
                    self.report_network_found(ctx, results);
                }
            }
            EngineEvent::PnoScanFailed => {
                let verdict = self
                    .tracker
                    .report(&message.iface, EngineStatus::Failed(Default::default()));
                if matches!(verdict, Some(EngineStatus::Failed(_))) {
                    error!("pno scan failed on every engine");
                    self.fail_session(ctx, PNO_SCAN_FAILED);
                }
            }
            other => {
                debug!(iface = %message.iface, event = ?other, "unexpected event for pno");
            }
        }
    }

    /// Events addressed to the internal client that runs confirming and
    /// software scans.
    pub fn handle_internal_event(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        event: ClientEvent,
    ) {
        if self.internal != Some(client) {
            debug!(client = %client, "dropping event for stale internal client");
            return;
        }
        match (self.state, event) {
            (PnoScanState::HwPnoSingleScan, ClientEvent::Results { scans }) => {
                let results = scans.last().map(|data| data.results.clone()).unwrap_or_default();
                self.report_network_found(ctx, results);
                self.state = PnoScanState::HwPno;
            }
            (PnoScanState::HwPnoSingleScan, ClientEvent::Failure { description, .. }) => {
                warn!(%description, "confirming single scan failed");
                self.fail_session(ctx, SINGLE_SCAN_FAILED);
            }
            (PnoScanState::SwPno, ClientEvent::Results { scans }) => {
                self.match_software_results(ctx, &scans);
            }
            (PnoScanState::SwPno, ClientEvent::SingleScanCompleted) => {
                if let Some(session) = self.software.as_mut() {
                    session.scan_in_flight = false;
                }
            }
            (PnoScanState::SwPno, ClientEvent::Failure { description, .. }) => {
                warn!(%description, "software pno scan failed");
                self.fail_session(ctx, SW_SCAN_FAILED);
            }
            _ => {}
        }
    }

    pub fn handle_timer(&mut self, ctx: &mut CoreContext, key: TimerKey) {
        // Whichever of the pair fires first cancels the other.
        match key {
            TimerKey::SoftwarePnoScan => ctx.timers.cancel(TimerKey::SoftwarePnoUpperBound),
            TimerKey::SoftwarePnoUpperBound => ctx.timers.cancel(TimerKey::SoftwarePnoScan),
            TimerKey::EmergencyScanEnd => return,
        }
        if self.state != PnoScanState::SwPno {
            return;
        }
        self.software_scan(ctx);
        self.software_schedule(ctx);
    }

    /// Self-posted once the software schedule runs out.
    pub fn handle_software_exhausted(&mut self, ctx: &mut CoreContext, session: u64) {
        if self.state != PnoScanState::SwPno || session != self.session {
            return;
        }
        info!(session, "software pno schedule exhausted");
        self.fail_session(ctx, SW_SCHEDULE_EXHAUSTED);
    }

    pub fn snapshot(&self) -> PnoScanSnapshot {
        PnoScanSnapshot {
            state: self.state,
            client: self.owner(),
            networks: self.request.as_ref().map_or(0, |r| r.pno.networks.len()),
            software_phase: self.software.as_ref().map(|s| s.schedule.phase_index()),
            software_iteration: self.software.as_ref().map(|s| s.schedule.iteration()),
            software_scan_in_flight: self
                .software
                .as_ref()
                .is_some_and(|s| s.scan_in_flight),
        }
    }

    fn start_hw(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        settings: ScanSettings,
        pno: PnoSettings,
    ) -> Result<()> {
        let native = to_native(&settings, &pno);
        let operation = ctx.next_operation();
        let accepted = self.tracker.start(operation, &ctx.engines, |iface, engine| {
            engine.set_hw_pno_list(&native, ctx.sink(iface, EngineSource::Pno, operation))
        });
        if !accepted {
            self.tracker.clear();
            return Err(ScanError::InvalidRequest(
                "no engine accepted the pno list".to_string(),
            ));
        }

        info!(client = %client, networks = native.networks.len(), %operation, "hardware pno started");
        self.begin_session(ctx, client, settings, pno);
        self.state = PnoScanState::HwPno;
        ctx.registry.deliver(client, ClientEvent::Success);
        Ok(())
    }

    fn start_sw(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        mut settings: ScanSettings,
        pno: PnoSettings,
    ) -> Result<()> {
        let schedule = SoftwarePnoSchedule::new(&ctx.config.pno, u64::from(settings.period_ms))?;
        settings.report_events |= ReportEvents::FULL_SCAN_RESULT | ReportEvents::AFTER_EACH_SCAN;

        info!(client = %client, networks = pno.networks.len(), "software pno started");
        self.begin_session(ctx, client, settings, pno);
        self.software = Some(SoftwareSession {
            schedule,
            scan_in_flight: false,
        });
        self.state = PnoScanState::SwPno;
        ctx.registry.deliver(client, ClientEvent::Success);

        self.software_scan(ctx);
        self.software_schedule(ctx);
        Ok(())
    }

    fn begin_session(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        settings: ScanSettings,
        pno: PnoSettings,
    ) {
        self.session += 1;
        let identity = ctx
            .registry
            .get(client)
            .map(|record| record.identity.clone());
        if let Some(identity) = identity {
            self.internal = Some(ctx.registry.register_internal(identity));
        }
        self.request = Some(PnoRequest {
            client,
            settings,
            pno,
        });
    }

    /// Exit actions of the offload or software sub-state; lands in Started.
    fn leave_session(&mut self, ctx: &mut CoreContext) {
        match self.state {
            PnoScanState::HwPno | PnoScanState::HwPnoSingleScan => {
                for iface in self.tracker.tracked_ifaces() {
                    if let Some(engine) = ctx.engines.get(iface)
                        && !engine.reset_hw_pno_list()
                    {
                        error!(iface = %iface, "failed to reset pno list");
                    }
                }
                self.tracker.clear();
            }
            PnoScanState::SwPno => {
                ctx.timers.cancel(TimerKey::SoftwarePnoScan);
                ctx.timers.cancel(TimerKey::SoftwarePnoUpperBound);
                self.software = None;
            }
            PnoScanState::Default | PnoScanState::Started => return,
        }
        if let Some(internal) = self.internal.take() {
            ctx.registry.remove(internal);
            self.released.push(internal);
        }
        self.state = PnoScanState::Started;
    }

    fn fail_session(&mut self, ctx: &mut CoreContext, description: &str) {
        self.leave_session(ctx);
        if let Some(request) = self.request.take() {
            ctx.registry
                .fail(request.client, FailureReason::Unspecified, description);
        }
    }

    fn request_internal_scan(&self, ctx: &CoreContext) {
        let (Some(internal), Some(request)) = (self.internal, self.request.as_ref()) else {
            return;
        };
        let uid = ctx.registry.get(internal).map(|r| r.identity.uid);
        ctx.post(Message::InternalSingleScan {
            client: internal,
            settings: request.settings.clone(),
            work_source: uid.map(WorkSource::from_uid).unwrap_or_default(),
        });
    }

    fn software_scan(&mut self, ctx: &mut CoreContext) {
        let in_flight = self.software.as_ref().is_some_and(|s| s.scan_in_flight);
        if in_flight {
            debug!("software pno scan still in flight; skipping tick");
            return;
        }
        self.request_internal_scan(ctx);
        if let Some(session) = self.software.as_mut() {
            session.scan_in_flight = true;
        }
    }

    fn software_schedule(&mut self, ctx: &mut CoreContext) {
        let Some(session) = self.software.as_mut() else {
            return;
        };
        if session.schedule.next() {
            let alarm = session.schedule.alarm();
            debug!(
                phase = session.schedule.phase_index(),
                iteration = session.schedule.iteration(),
                delay_ms = alarm.delay.as_millis() as u64,
                "next software pno scan scheduled"
            );
            ctx.timers.arm(TimerKey::SoftwarePnoScan, alarm);
            match session.schedule.upper_bound() {
                Some(bound) => ctx.timers.arm(TimerKey::SoftwarePnoUpperBound, bound),
                None => ctx.timers.cancel(TimerKey::SoftwarePnoUpperBound),
            }
        } else {
            ctx.post(Message::StopSoftwarePno {
                session: self.session,
            });
        }
    }

    fn match_software_results(&mut self, ctx: &mut CoreContext, scans: &[ScanData]) {
        let Some(request) = self.request.as_ref() else {
            return;
        };
        let matches: Vec<ScanResult> = scans
            .iter()
            .flat_map(|data| data.results.iter())
            .filter(|result| {
                request
                    .pno
                    .networks
                    .iter()
                    .any(|network| network.ssid == result.ssid)
            })
            .cloned()
            .collect();
        if !matches.is_empty() {
            self.report_network_found(ctx, matches);
        }
    }

    fn report_network_found(&mut self, ctx: &mut CoreContext, results: Vec<ScanResult>) {
        if let Some(request) = self.request.as_ref() {
            debug!(client = %request.client, count = results.len(), "pno network found");
            ctx.registry
                .deliver(request.client, ClientEvent::PnoNetworkFound { results });
        }
    }
}
