//! Periodic batched scanning on one pinned engine.
//!
//! Every admission or removal recomputes the whole bucket schedule from the
//! active request set. An unchanged schedule is not reinstalled. While the
//! engine has paused batched scanning, incoming work is deferred and
//! replayed in order once it restarts.

pub mod bucket;

use std::collections::{BTreeMap, VecDeque};
use std::mem;
use std::sync::Arc;

use scanmux_model::{
    ClientEvent, ClientId, FailureReason, NativeScanSettings, ScanCapabilities,
    ScanData, ScanResult, ScanSettings, WorkSource,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{NOT_AVAILABLE, Result, ScanError};

use super::context::CoreContext;
use super::engine::{
    EngineEvent, EngineSource, OperationId, ScanStatus, ScannerEngine,
};
use super::message::EngineMessage;
use super::single::INTERRUPTED;

pub use bucket::{BackgroundSchedule, compute_schedule};

const SCAN_FAILED: &str = "Background Scan failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundScanState {
    Default,
    Started,
    Paused,
}

#[derive(Debug, Clone)]
struct BackgroundRequest {
    client: ClientId,
    settings: ScanSettings,
    work_source: WorkSource,
}

/// Work held back while the engine has batched scanning paused.
#[derive(Debug, Clone)]
enum Deferred {
    Start {
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    },
    Stop(ClientId),
    GetResults(ClientId),
    Engine(EngineMessage),
}

#[derive(Debug, Clone, Serialize)]
pub struct BackgroundScanSnapshot {
    pub state: BackgroundScanState,
    pub iface: Option<String>,
    pub requests: usize,
    pub deferred: usize,
    pub installed_buckets: usize,
    pub base_period_ms: u32,
}

pub struct BackgroundScanScheduler {
    state: BackgroundScanState,
    engine: Option<Arc<dyn ScannerEngine>>,
    capabilities: ScanCapabilities,
    requests: Vec<BackgroundRequest>,
    buckets: BTreeMap<ClientId, u32>,
    /// Schedule last handed to the engine; `None` forces the next recompute
    /// to reinstall.
    installed: Option<NativeScanSettings>,
    operation: Option<OperationId>,
    deferred: VecDeque<Deferred>,
}

impl std::fmt::Debug for BackgroundScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundScanScheduler")
            .field("state", &self.state)
            .field("iface", &self.engine.as_ref().map(|e| e.iface_name().clone()))
            .field("requests", &self.requests.len())
            .field("deferred", &self.deferred.len())
            .field("operation", &self.operation)
            .finish()
    }
}

impl Default for BackgroundScanScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundScanScheduler {
    pub fn new() -> Self {
        Self {
            state: BackgroundScanState::Default,
            engine: None,
            capabilities: ScanCapabilities::default(),
            requests: Vec::new(),
            buckets: BTreeMap::new(),
            installed: None,
            operation: None,
            deferred: VecDeque::new(),
        }
    }

    pub fn state(&self) -> BackgroundScanState {
        self.state
    }

    pub fn installed_schedule(&self) -> Option<&NativeScanSettings> {
        self.installed.as_ref()
    }

    /// Pins the first engine and reads its batched scan limits.
    pub fn enable(&mut self, ctx: &mut CoreContext) {
        if self.state != BackgroundScanState::Default {
            error!("background scheduler enabled while already started");
            return;
        }
        let Some(engine) = ctx.engines.first().cloned() else {
            error!("cannot start background scans: no scanner engines bound");
            return;
        };
        let Some(capabilities) = engine.scan_capabilities() else {
            error!(iface = %engine.iface_name(), "could not get scan capabilities");
            return;
        };
        if capabilities.max_buckets <= 0 {
            error!(
                iface = %engine.iface_name(),
                max_buckets = capabilities.max_buckets,
                "invalid max buckets in scan capabilities"
            );
            return;
        }
        info!(
            iface = %engine.iface_name(),
            max_buckets = capabilities.max_buckets,
            max_ap_per_scan = capabilities.max_ap_per_scan,
            "background scan scheduler started"
        );
        self.engine = Some(engine);
        self.capabilities = capabilities;
        self.state = BackgroundScanState::Started;
    }

    /// Honoured from `Paused` as well; deferred starts are refused.
    pub fn disable(&mut self, ctx: &mut CoreContext) {
        if self.state == BackgroundScanState::Default {
            return;
        }
        for deferred in mem::take(&mut self.deferred) {
            match deferred {
                Deferred::Start { client, .. } | Deferred::GetResults(client) => {
                    ctx.registry
                        .fail(client, FailureReason::Unspecified, NOT_AVAILABLE);
                }
                Deferred::Stop(_) | Deferred::Engine(_) => {}
            }
        }
        self.exit_started(ctx);
        self.state = BackgroundScanState::Default;
        info!("background scan scheduler stopped");
    }

    pub fn start_scan(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    ) {
        match self.state {
            BackgroundScanState::Default => {
                ctx.registry.reject(
                    client,
                    &ScanError::NotAvailable("background scanning is disabled".to_string()),
                );
            }
            BackgroundScanState::Paused => {
                self.deferred.push_back(Deferred::Start {
                    client,
                    settings,
                    work_source,
                });
            }
            BackgroundScanState::Started => {
                self.admit(ctx, client, settings, work_source);
            }
        }
    }

    pub fn stop_scan(&mut self, ctx: &mut CoreContext, client: ClientId) {
        match self.state {
            BackgroundScanState::Default => {}
            BackgroundScanState::Paused => self.deferred.push_back(Deferred::Stop(client)),
            BackgroundScanState::Started => self.remove_request(ctx, client),
        }
    }

    pub fn remove_all_for_client(&mut self, ctx: &mut CoreContext, client: ClientId) {
        self.stop_scan(ctx, client);
    }

    /// Flushes the engine's batched results and reports them to every
    /// active request.
    pub fn get_batched_results(&mut self, ctx: &mut CoreContext, client: ClientId) {
        match self.state {
            BackgroundScanState::Default => {
                ctx.registry.reject(
                    client,
                    &ScanError::NotAvailable("background scanning is disabled".to_string()),
                );
            }
            BackgroundScanState::Paused => {
                self.deferred.push_back(Deferred::GetResults(client));
            }
            BackgroundScanState::Started => self.flush_and_report(ctx),
        }
    }

    pub fn handle_engine_event(&mut self, ctx: &mut CoreContext, message: EngineMessage) {
        if self.operation != Some(message.operation) {
            debug!(iface = %message.iface, operation = %message.operation, "ignoring stale background event");
            return;
        }
        match self.state {
            BackgroundScanState::Default => {}
            BackgroundScanState::Paused => {
                if message.event == EngineEvent::ScanRestarted {
                    info!(iface = %message.iface, "background scan restarted");
                    self.state = BackgroundScanState::Started;
                    self.replay_deferred(ctx);
                } else {
                    self.deferred.push_back(Deferred::Engine(message));
                }
            }
            BackgroundScanState::Started => self.on_started_event(ctx, message),
        }
    }

    pub fn snapshot(&self) -> BackgroundScanSnapshot {
        BackgroundScanSnapshot {
            state: self.state,
            iface: self
                .engine
                .as_ref()
                .map(|engine| engine.iface_name().to_string()),
            requests: self.requests.len(),
            deferred: self.deferred.len(),
            installed_buckets: self
                .installed
                .as_ref()
                .map_or(0, NativeScanSettings::num_buckets),
            base_period_ms: self.installed.as_ref().map_or(0, |s| s.base_period_ms),
        }
    }

    fn on_started_event(&mut self, ctx: &mut CoreContext, message: EngineMessage) {
        match message.event {
            EngineEvent::ScanStatus(
                ScanStatus::ResultsAvailable
                | ScanStatus::ThresholdNumScans
                | ScanStatus::ThresholdPercent,
            ) => self.flush_and_report(ctx),
            EngineEvent::ScanStatus(ScanStatus::Failed(failure)) => {
                error!(iface = %message.iface, description = failure.description(), "background scan failed");
                self.fail_all_and_clear(ctx, SCAN_FAILED);
                self.installed = None;
            }
            EngineEvent::FullResult {
                result,
                buckets_scanned,
            } => self.report_full_result(ctx, &result, buckets_scanned),
            EngineEvent::ScanPaused(scans) => {
                info!(iface = %message.iface, "background scan paused");
                self.report_scan_results(ctx, &scans);
                self.state = BackgroundScanState::Paused;
            }
            EngineEvent::ScanRestarted => {
                debug!(iface = %message.iface, "restart while not paused");
            }
            other => {
                debug!(iface = %message.iface, event = ?other, "unexpected event for background scan");
            }
        }
    }

    fn replay_deferred(&mut self, ctx: &mut CoreContext) {
        // Anything that pauses again mid-replay is re-deferred in order.
        let pending = mem::take(&mut self.deferred);
        for deferred in pending {
            match deferred {
                Deferred::Start {
                    client,
                    settings,
                    work_source,
                } => {
                    if ctx.registry.contains(client) {
                        self.start_scan(ctx, client, settings, work_source);
                    }
                }
                Deferred::Stop(client) => self.stop_scan(ctx, client),
                Deferred::GetResults(client) => self.get_batched_results(ctx, client),
                Deferred::Engine(message) => self.handle_engine_event(ctx, message),
            }
        }
    }

    fn exit_started(&mut self, ctx: &mut CoreContext) {
        self.fail_all_and_clear(ctx, INTERRUPTED);
        if let Some(engine) = self.engine.take()
            && self.installed.as_ref().is_some_and(|s| s.num_buckets() > 0)
        {
            engine.stop_batched_scan();
        }
        self.installed = None;
        self.operation = None;
    }

    fn fail_all_and_clear(&mut self, ctx: &mut CoreContext, description: &str) {
        for request in self.requests.drain(..) {
            debug!(client = %request.client, description, "background scan failed");
            ctx.registry
                .fail(request.client, FailureReason::Unspecified, description);
        }
        self.buckets.clear();
    }

    /// Validation order: minimum period, band or channels, achievable period
    /// for the channel count, then backoff bounds.
    fn validate(&self, ctx: &CoreContext, settings: &ScanSettings) -> Result<()> {
        let limits = &ctx.config.background;
        let invalid = |detail: String| Err(ScanError::InvalidRequest(detail));
        if settings.period_ms < limits.min_period_ms {
            return invalid(format!(
                "period {}ms below minimum {}ms",
                settings.period_ms, limits.min_period_ms
            ));
        }
        if settings.band.is_unspecified() && settings.channels.is_empty() {
            return invalid("no band or channels specified".to_string());
        }
        let channel_count = ctx.plan().channel_count(settings) as u64;
        let min_supported = channel_count * u64::from(limits.scan_period_per_channel_ms);
        if u64::from(settings.period_ms) < min_supported {
            return invalid(format!(
                "period {}ms shorter than estimated scan duration {min_supported}ms",
                settings.period_ms
            ));
        }
        if settings.uses_backoff() {
            if settings.max_period_ms < settings.period_ms {
                return invalid(format!(
                    "max period {}ms below period {}ms",
                    settings.max_period_ms, settings.period_ms
                ));
            }
            if settings.max_period_ms > limits.max_period_ms {
                return invalid(format!(
                    "max period {}ms above supported {}ms",
                    settings.max_period_ms, limits.max_period_ms
                ));
            }
            if settings.step_count < 1 {
                return invalid(format!("step count {} below 1", settings.step_count));
            }
        }
        Ok(())
    }

    fn check_admission(
        &self,
        ctx: &CoreContext,
        client: ClientId,
        settings: &ScanSettings,
    ) -> Result<()> {
        if !ctx.registry.contains(client) {
            return Err(ScanError::UnknownClient(client));
        }
        if self.requests.iter().any(|r| r.client == client) {
            return Err(ScanError::DuplicateRequest(
                "background scan already outstanding".to_string(),
            ));
        }
        self.validate(ctx, settings)
    }

    fn admit(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    ) {
        if let Err(err) = self.check_admission(ctx, client, &settings) {
            warn!(client = %client, error = %err, "rejecting background scan");
            ctx.registry.reject(client, &err);
            return;
        }

        debug!(
            client = %client,
            period_ms = settings.period_ms,
            band = %settings.band,
            uids = ?work_source.uids,
            "background scan admitted"
        );
        self.requests.push(BackgroundRequest {
            client,
            settings,
            work_source,
        });
        match self.update_schedule(ctx) {
            Ok(()) => {
                ctx.registry.deliver(client, ClientEvent::Success);
            }
            Err(err) => {
                self.requests.pop();
                warn!(client = %client, error = %err, "failing background scan: schedule could not be installed");
                ctx.registry.reject(client, &err);
            }
        }
    }

    fn remove_request(&mut self, ctx: &mut CoreContext, client: ClientId) {
        let before = self.requests.len();
        self.requests.retain(|r| r.client != client);
        if self.requests.len() != before {
            debug!(client = %client, "background scan removed");
            self.buckets.remove(&client);
            if let Err(err) = self.update_schedule(ctx) {
                warn!(client = %client, error = %err, "background schedule not reinstalled after removal");
            }
        }
    }

    /// Recomputes and installs the schedule. Bucket assignments only change
    /// once the new schedule is in place; a refused schedule leaves the
    /// previous assignments serving the running scan.
    fn update_schedule(&mut self, ctx: &mut CoreContext) -> Result<()> {
        let Some(engine) = self.engine.clone() else {
            return Err(ScanError::NotAvailable(
                "no engine pinned for background scans".to_string(),
            ));
        };
        let settings: Vec<&ScanSettings> =
            self.requests.iter().map(|r| &r.settings).collect();
        let schedule = compute_schedule(ctx.plan(), &settings, self.capabilities)?;
        let buckets: BTreeMap<ClientId, u32> = self
            .requests
            .iter()
            .enumerate()
            .filter_map(|(index, r)| schedule.bucket_for(index).map(|b| (r.client, b)))
            .collect();

        if self.installed.as_ref() == Some(&schedule.settings) {
            debug!("background schedule unchanged");
            self.buckets = buckets;
            return Ok(());
        }

        if schedule.num_buckets() == 0 {
            engine.stop_batched_scan();
            debug!(iface = %engine.iface_name(), "batched scan stopped");
            self.installed = Some(schedule.settings);
            self.buckets = buckets;
            return Ok(());
        }

        let operation = ctx.next_operation();
        let sink = ctx.sink(engine.iface_name(), EngineSource::Background, operation);
        if !engine.start_batched_scan(&schedule.settings, sink) {
            error!(
                iface = %engine.iface_name(),
                buckets = schedule.num_buckets(),
                base_period_ms = schedule.settings.base_period_ms,
                "error starting batched scan"
            );
            self.installed = None;
            return Err(ScanError::Unschedulable(format!(
                "engine {} refused the batched scan",
                engine.iface_name()
            )));
        }

        info!(
            iface = %engine.iface_name(),
            %operation,
            buckets = schedule.num_buckets(),
            base_period_ms = schedule.settings.base_period_ms,
            max_ap_per_scan = schedule.settings.max_ap_per_scan,
            "batched scan started"
        );
        self.operation = Some(operation);
        self.installed = Some(schedule.settings);
        self.buckets = buckets;
        Ok(())
    }

    fn flush_and_report(&mut self, ctx: &mut CoreContext) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        let scans = engine.latest_batched_scan_results(true);
        self.report_scan_results(ctx, &scans);
    }

    fn report_scan_results(&self, ctx: &mut CoreContext, scans: &[ScanData]) {
        for request in &self.requests {
            let filtered = bucket::filter_results_for_settings(
                ctx.plan(),
                self.buckets.get(&request.client).copied(),
                &request.settings,
                scans,
            );
            if let Some(scans) = filtered {
                ctx.registry
                    .deliver(request.client, ClientEvent::Results { scans });
            }
        }
    }

    fn report_full_result(
        &self,
        ctx: &mut CoreContext,
        result: &ScanResult,
        buckets_scanned: u32,
    ) {
        for request in &self.requests {
            if bucket::should_report_full_result(
                ctx.plan(),
                self.buckets.get(&request.client).copied(),
                &request.settings,
                result,
                buckets_scanned,
            ) {
                ctx.registry.deliver(
                    request.client,
                    ClientEvent::FullResult {
                        result: result.clone(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BAD_REQUEST;
    use crate::scan::testing::{self, FakeEngine, TestHarness};
    use scanmux_model::WifiBand;

    fn periodic(period_ms: u32) -> ScanSettings {
        ScanSettings {
            period_ms,
            ..ScanSettings::for_band(WifiBand::BAND_24_GHZ)
        }
    }

    fn started() -> (TestHarness, Arc<FakeEngine>, BackgroundScanScheduler) {
        let engine = FakeEngine::new("wlan0");
        let mut harness = TestHarness::new(&[&engine]);
        let mut scheduler = BackgroundScanScheduler::new();
        scheduler.enable(&mut harness.ctx);
        assert_eq!(scheduler.state(), BackgroundScanState::Started);
        (harness, engine, scheduler)
    }

    #[test]
    fn unchanged_schedule_is_not_reinstalled() {
        let (mut h, engine, mut scheduler) = started();
        let (a, mut a_events) = h.client();
        let (b, mut b_events) = h.client();

        scheduler.start_scan(&mut h.ctx, a, periodic(20_000), WorkSource::default());
        assert_eq!(engine.batched_starts().len(), 1);

        // Same period and band: identical schedule, no second install.
        scheduler.start_scan(&mut h.ctx, b, periodic(20_000), WorkSource::default());
        assert_eq!(engine.batched_starts().len(), 1);
        assert_eq!(testing::drain(&mut a_events), vec![ClientEvent::Success]);
        assert_eq!(testing::drain(&mut b_events), vec![ClientEvent::Success]);

        scheduler.stop_scan(&mut h.ctx, b);
        assert_eq!(engine.batched_starts().len(), 1);
        assert_eq!(engine.batched_stops(), 0);

        scheduler.stop_scan(&mut h.ctx, a);
        assert_eq!(engine.batched_stops(), 1);
    }

    #[test]
    fn invalid_requests_are_rejected_without_engine_calls() {
        let (mut h, engine, mut scheduler) = started();
        let (client, mut events) = h.client();

        // Below the minimum period.
        scheduler.start_scan(&mut h.ctx, client, periodic(500), WorkSource::default());
        // 13 channels need 2 600 ms per pass.
        scheduler.start_scan(&mut h.ctx, client, periodic(2_000), WorkSource::default());
        // Backoff ceiling beyond the supported maximum.
        let mut backoff = periodic(10_000);
        backoff.max_period_ms = 2_048_000;
        backoff.step_count = 1;
        scheduler.start_scan(&mut h.ctx, client, backoff, WorkSource::default());
        // No band and no channels.
        let empty = ScanSettings {
            period_ms: 10_000,
            ..ScanSettings::default()
        };
        scheduler.start_scan(&mut h.ctx, client, empty, WorkSource::default());

        let events = testing::drain(&mut events);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| *e
            == ClientEvent::failure(FailureReason::InvalidRequest, BAD_REQUEST)));
        assert!(engine.batched_starts().is_empty());
    }

    #[test]
    fn refused_install_fails_admission_and_forces_retry() {
        let (mut h, engine, mut scheduler) = started();
        let (client, mut events) = h.client();
        engine.reject_starts(true);

        scheduler.start_scan(&mut h.ctx, client, periodic(20_000), WorkSource::default());
        assert_eq!(
            testing::drain(&mut events),
            vec![ClientEvent::failure(FailureReason::InvalidRequest, BAD_REQUEST)]
        );
        assert!(scheduler.installed_schedule().is_none());

        engine.reject_starts(false);
        scheduler.start_scan(&mut h.ctx, client, periodic(20_000), WorkSource::default());
        assert_eq!(testing::drain(&mut events), vec![ClientEvent::Success]);
        assert_eq!(engine.batched_starts().len(), 1);
    }

    #[test]
    fn refused_install_keeps_surviving_bucket_assignments() {
        let (mut h, engine, mut scheduler) = started();
        let (a, mut a_events) = h.client();
        let (b, mut b_events) = h.client();
        scheduler.start_scan(&mut h.ctx, a, periodic(20_000), WorkSource::default());
        assert_eq!(testing::drain(&mut a_events), vec![ClientEvent::Success]);

        engine.reject_starts(true);
        let faster_5ghz = ScanSettings {
            period_ms: 10_000,
            ..ScanSettings::for_band(WifiBand::BAND_5_GHZ)
        };
        scheduler.start_scan(&mut h.ctx, b, faster_5ghz, WorkSource::default());
        assert_eq!(
            testing::drain(&mut b_events),
            vec![ClientEvent::failure(FailureReason::InvalidRequest, BAD_REQUEST)]
        );

        let mut data = ScanData::new(
            WifiBand::BAND_24_GHZ,
            vec![ScanResult::new("home", "00:0a", 2412, 7)],
        );
        data.buckets_scanned = 0b1;
        engine.set_batched_results(vec![data]);
        engine
            .last_batched_sink()
            .emit(EngineEvent::ScanStatus(ScanStatus::ResultsAvailable));
        h.pump(|ctx, message| scheduler.handle_engine_event(ctx, message));

        let events = testing::drain(&mut a_events);
        let [ClientEvent::Results { scans }] = events.as_slice() else {
            panic!("expected results for the surviving request, got {events:?}");
        };
        assert_eq!(scans[0].results[0].ssid, "home");
        assert!(testing::drain(&mut b_events).is_empty());
    }

    #[test]
    fn paused_defers_until_restart() {
        let (mut h, engine, mut scheduler) = started();
        let (a, mut a_events) = h.client();
        let (b, mut b_events) = h.client();
        scheduler.start_scan(&mut h.ctx, a, periodic(20_000), WorkSource::default());
        testing::drain(&mut a_events);

        let sink = engine.last_batched_sink();
        sink.emit(EngineEvent::ScanPaused(vec![ScanData::new(
            WifiBand::BAND_24_GHZ,
            vec![ScanResult::new("cafe", "00:11", 2412, 5)],
        )]));
        h.pump(|ctx, message| scheduler.handle_engine_event(ctx, message));
        assert_eq!(scheduler.state(), BackgroundScanState::Paused);
        assert!(matches!(
            testing::drain(&mut a_events).as_slice(),
            [ClientEvent::Results { .. }]
        ));

        scheduler.start_scan(&mut h.ctx, b, periodic(40_000), WorkSource::default());
        assert!(testing::drain(&mut b_events).is_empty());
        assert_eq!(engine.batched_starts().len(), 1);

        sink.emit(EngineEvent::ScanRestarted);
        h.pump(|ctx, message| scheduler.handle_engine_event(ctx, message));
        assert_eq!(scheduler.state(), BackgroundScanState::Started);
        assert_eq!(testing::drain(&mut b_events), vec![ClientEvent::Success]);
        assert_eq!(engine.batched_starts().len(), 2);
    }

    #[test]
    fn disable_while_paused_fails_deferred_starts() {
        let (mut h, engine, mut scheduler) = started();
        let (a, mut a_events) = h.client();
        let (b, mut b_events) = h.client();
        scheduler.start_scan(&mut h.ctx, a, periodic(20_000), WorkSource::default());
        testing::drain(&mut a_events);

        engine.last_batched_sink().emit(EngineEvent::ScanPaused(Vec::new()));
        h.pump(|ctx, message| scheduler.handle_engine_event(ctx, message));
        scheduler.start_scan(&mut h.ctx, b, periodic(40_000), WorkSource::default());

        scheduler.disable(&mut h.ctx);
        assert_eq!(scheduler.state(), BackgroundScanState::Default);
        assert_eq!(
            testing::drain(&mut a_events),
            vec![ClientEvent::failure(FailureReason::Unspecified, INTERRUPTED)]
        );
        assert_eq!(
            testing::drain(&mut b_events),
            vec![ClientEvent::failure(FailureReason::Unspecified, NOT_AVAILABLE)]
        );
    }

    #[test]
    fn async_failure_fails_everyone_and_clears_schedule() {
        let (mut h, engine, mut scheduler) = started();
        let (a, mut a_events) = h.client();
        scheduler.start_scan(&mut h.ctx, a, periodic(20_000), WorkSource::default());
        testing::drain(&mut a_events);

        engine
            .last_batched_sink()
            .emit(EngineEvent::ScanStatus(ScanStatus::Failed(Default::default())));
        h.pump(|ctx, message| scheduler.handle_engine_event(ctx, message));

        assert_eq!(
            testing::drain(&mut a_events),
            vec![ClientEvent::failure(FailureReason::Unspecified, SCAN_FAILED)]
        );
        assert!(scheduler.installed_schedule().is_none());
        assert_eq!(scheduler.snapshot().requests, 0);
    }

    #[test]
    fn results_available_flushes_and_filters() {
        let (mut h, engine, mut scheduler) = started();
        let (a, mut a_events) = h.client();
        scheduler.start_scan(&mut h.ctx, a, periodic(20_000), WorkSource::default());
        testing::drain(&mut a_events);

        let mut data = ScanData::new(
            WifiBand::BAND_BOTH,
            vec![
                ScanResult::new("near", "00:01", 2437, 9),
                ScanResult::new("far", "00:02", 5180, 9),
            ],
        );
        data.buckets_scanned = 0b1;
        engine.set_batched_results(vec![data]);
        engine
            .last_batched_sink()
            .emit(EngineEvent::ScanStatus(ScanStatus::ResultsAvailable));
        h.pump(|ctx, message| scheduler.handle_engine_event(ctx, message));

        let events = testing::drain(&mut a_events);
        let [ClientEvent::Results { scans }] = events.as_slice() else {
            panic!("expected results, got {events:?}");
        };
        assert_eq!(scans[0].results.len(), 1);
        assert_eq!(scans[0].results[0].ssid, "near");
    }

    #[test]
    fn enable_requires_bucket_capacity() {
        let engine = FakeEngine::new("wlan0");
        engine.set_capabilities(Some(ScanCapabilities {
            max_buckets: 0,
            max_ap_per_scan: 16,
        }));
        let mut h = TestHarness::new(&[&engine]);
        let mut scheduler = BackgroundScanScheduler::new();
        scheduler.enable(&mut h.ctx);
        assert_eq!(scheduler.state(), BackgroundScanState::Default);

        let (client, mut events) = h.client();
        scheduler.start_scan(&mut h.ctx, client, periodic(20_000), WorkSource::default());
        assert_eq!(
            testing::drain(&mut events),
            vec![ClientEvent::failure(FailureReason::Unspecified, NOT_AVAILABLE)]
        );
    }
}
