//! One-shot scan scheduling.
//!
//! Requests queue as pending and are folded into one merged operation that
//! is issued to every engine. While an operation is in flight, new requests
//! it already covers join it; the rest wait for the next operation.

use std::collections::BTreeSet;
use std::mem;

use scanmux_model::{
    BucketSettings, ClientEvent, ClientId, FailureReason, InformationElement,
    NativeScanSettings, ReportEvents, ScanData, ScanResult, ScanSettings,
    ScanType, WorkSource,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScanError};

use super::channels::{ChannelCollection, ChannelPlan};
use super::context::CoreContext;
use super::engine::{EngineEvent, EngineSource, ScanStatus};
use super::events::ScanActivityEvent;
use super::message::EngineMessage;
use super::timers::{AlarmSpec, TimerKey};
use super::tracker::{EngineStatus, ImplsTracker};

pub(crate) const INTERRUPTED: &str = "Scan was interrupted";
const FAILED_TO_START: &str = "Failed to start single scan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleScanState {
    /// Scanning disabled. Only emergency requests are queued.
    Default,
    /// Engines up, nothing in flight.
    Idle,
    /// One merged operation in flight.
    Scanning,
}

#[derive(Debug, Clone)]
struct SingleRequest {
    client: ClientId,
    settings: ScanSettings,
    work_source: WorkSource,
}

impl SingleRequest {
    fn is_emergency(&self) -> bool {
        self.settings.ignore_location_settings
    }
}

/// Parameters of the operation currently in flight.
#[derive(Debug, Clone)]
struct ActiveScan {
    scan_type: ScanType,
    report_events: ReportEvents,
    channels: ChannelCollection,
    hidden_networks: BTreeSet<String>,
    vendor_ies: Vec<InformationElement>,
}

/// Merged-scan type rule: a high accuracy request wins, otherwise the most
/// recent type wins.
pub fn merge_scan_types(existing: ScanType, requested: ScanType) -> ScanType {
    match existing {
        ScanType::LowLatency | ScanType::LowPower => requested,
        ScanType::HighAccuracy => ScanType::HighAccuracy,
    }
}

/// Whether an operation of type `active` can serve a request for `requested`.
pub fn scan_type_satisfies(active: ScanType, requested: ScanType) -> bool {
    match active {
        ScanType::LowLatency | ScanType::LowPower => {
            requested != ScanType::HighAccuracy
        }
        ScanType::HighAccuracy => true,
    }
}

/// Counters exposed through the diagnostics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SingleScanSnapshot {
    pub state: SingleScanState,
    pub pending: usize,
    pub active: usize,
    pub listeners: usize,
    pub cached_results: usize,
    pub emergency_scan_in_progress: bool,
}

#[derive(Debug)]
pub struct SingleScanScheduler {
    state: SingleScanState,
    pending: Vec<SingleRequest>,
    active: Vec<SingleRequest>,
    active_scan: Option<ActiveScan>,
    tracker: ImplsTracker,
    listeners: BTreeSet<ClientId>,
    cached_results: Vec<ScanResult>,
    emergency_in_progress: bool,
}

impl Default for SingleScanScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleScanScheduler {
    pub fn new() -> Self {
        Self {
            state: SingleScanState::Default,
            pending: Vec::new(),
            active: Vec::new(),
            active_scan: None,
            tracker: ImplsTracker::default(),
            listeners: BTreeSet::new(),
            cached_results: Vec::new(),
            emergency_in_progress: false,
        }
    }

    pub fn state(&self) -> SingleScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == SingleScanState::Scanning
    }

    pub fn enable(&mut self, ctx: &mut CoreContext) {
        if self.state != SingleScanState::Default {
            return;
        }
        if ctx.engines.is_empty() {
            error!("cannot enable single scans: no scanner engines bound");
            return;
        }
        info!(engines = ctx.engines.len(), "single scan scheduler enabled");
        self.enter_idle(ctx);
    }

    pub fn disable(&mut self, ctx: &mut CoreContext) {
        if self.state == SingleScanState::Scanning {
            self.exit_scanning(ctx);
        }
        if self.state != SingleScanState::Default {
            // Leaving the driver-started family drops the cache and fails
            // whatever is still queued.
            self.cached_results.clear();
            let pending = mem::take(&mut self.pending);
            fail_all(ctx, pending, FailureReason::Unspecified, INTERRUPTED);
            self.state = SingleScanState::Default;
            info!("single scan scheduler disabled");
        }
        self.pending.clear();
        self.active.clear();
        self.end_orphaned_emergency(ctx);
    }

    pub fn start_scan(
        &mut self,
        ctx: &mut CoreContext,
        client: ClientId,
        settings: ScanSettings,
        work_source: WorkSource,
    ) {
        let request = SingleRequest {
            client,
            settings,
            work_source,
        };
        if let Err(err) = self.check_admission(ctx, &request) {
            warn!(client = %client, error = %err, "rejecting single scan");
            ctx.registry.reject(client, &err);
            return;
        }

        debug!(
            client = %client,
            band = %request.settings.band,
            scan_type = request.settings.scan_type.as_str(),
            uids = ?request.work_source.uids,
            "single scan admitted"
        );
        ctx.registry.deliver(client, ClientEvent::Success);

        if request.is_emergency() {
            ctx.timers.cancel(TimerKey::EmergencyScanEnd);
            self.set_emergency(ctx, true);
        }

        match self.state {
            SingleScanState::Scanning => {
                if self.active_scan_satisfies(ctx.plan(), &request.settings) {
                    debug!(client = %client, "request joins in-flight scan");
                    self.active.push(request);
                } else {
                    self.pending.push(request);
                }
            }
            SingleScanState::Idle => {
                self.pending.push(request);
                self.try_start_new_scan(ctx);
            }
            SingleScanState::Default => self.pending.push(request),
        }
    }

    /// Drops the client's requests without a callback. An in-flight
    /// operation keeps running.
    pub fn stop_scan(&mut self, client: ClientId) {
        self.pending.retain(|r| r.client != client);
        self.active.retain(|r| r.client != client);
    }

    /// Cleanup for a departing client. When it owned every request of the
    /// in-flight operation, the operation is abandoned and the scheduler
    /// moves on to the pending queue.
    pub fn remove_all_for_client(&mut self, ctx: &mut CoreContext, client: ClientId) {
        let had_active = self.active.iter().any(|r| r.client == client);
        self.stop_scan(client);
        self.listeners.remove(&client);
        if had_active && self.active.is_empty() && self.is_scanning() {
            debug!(client = %client, "abandoning scan owned by departed client");
            self.tracker.clear();
            self.exit_scanning(ctx);
            self.enter_idle(ctx);
        }
        self.end_orphaned_emergency(ctx);
    }

    pub fn add_listener(&mut self, client: ClientId) {
        self.listeners.insert(client);
    }

    pub fn remove_listener(&mut self, client: ClientId) {
        self.listeners.remove(&client);
    }

    /// Cached full-band results younger than the configured max age.
    pub fn cached_scan_results(&self, ctx: &CoreContext) -> Vec<ScanResult> {
        let now_ms = ctx.clock.elapsed_since_boot_ms();
        let max_age_ms = ctx.config.single.cached_results_max_age_ms;
        self.cached_results
            .iter()
            .filter(|result| now_ms.saturating_sub(result.timestamp_us / 1000) < max_age_ms)
            .cloned()
            .collect()
    }

    pub fn handle_engine_event(&mut self, ctx: &mut CoreContext, message: EngineMessage) {
        if self.state != SingleScanState::Scanning || !self.tracker.is_current(message.operation) {
            debug!(iface = %message.iface, operation = %message.operation, "ignoring stale single scan event");
            return;
        }
        let status = match message.event {
            EngineEvent::ScanStatus(
                ScanStatus::ResultsAvailable
                | ScanStatus::ThresholdNumScans
                | ScanStatus::ThresholdPercent,
            ) => EngineStatus::Succeeded,
            EngineEvent::ScanStatus(ScanStatus::Failed(failure)) => {
                EngineStatus::Failed(failure)
            }
            EngineEvent::FullResult { result, .. } => {
                if self.tracker.is_pending(&message.iface) {
                    self.report_full_result(ctx, result);
                }
                return;
            }
            other => {
                debug!(iface = %message.iface, event = ?other, "unexpected event for single scan");
                return;
            }
        };

        match self.tracker.report(&message.iface, status) {
            Some(EngineStatus::Succeeded) => {
                match self.tracker.merged_single_scan_results(&ctx.engines) {
                    Some(data) => self.handle_scan_results(ctx, data),
                    None => error!("single scan succeeded without results"),
                }
                self.finish_operation(ctx);
            }
            Some(EngineStatus::Failed(failure)) => {
                warn!(description = failure.description(), "single scan failed on every engine");
                self.arm_emergency_end_if_needed(ctx, &self.active.clone());
                let active = mem::take(&mut self.active);
                fail_all(ctx, active, FailureReason::Unspecified, failure.description());
                self.finish_operation(ctx);
            }
            _ => {}
        }
    }

    pub fn handle_emergency_end(&mut self, ctx: &mut CoreContext) {
        self.set_emergency(ctx, false);
    }

    pub fn snapshot(&self, ctx: &CoreContext) -> SingleScanSnapshot {
        SingleScanSnapshot {
            state: self.state,
            pending: self.pending.len(),
            active: self.active.len(),
            listeners: self.listeners.len(),
            cached_results: self.cached_scan_results(ctx).len(),
            emergency_scan_in_progress: self.emergency_in_progress,
        }
    }

    fn check_admission(&self, ctx: &CoreContext, request: &SingleRequest) -> Result<()> {
        if !ctx.registry.contains(request.client) {
            return Err(ScanError::UnknownClient(request.client));
        }
        let settings = &request.settings;
        if settings.band.is_unspecified() && settings.channels.is_empty() {
            return Err(ScanError::InvalidRequest(
                "no band or channels specified".to_string(),
            ));
        }
        if self.owns_request(request.client) {
            return Err(ScanError::DuplicateRequest(
                "single scan already outstanding".to_string(),
            ));
        }
        if self.state == SingleScanState::Default && !request.is_emergency() {
            return Err(ScanError::NotAvailable("scanning is disabled".to_string()));
        }
        Ok(())
    }

    fn owns_request(&self, client: ClientId) -> bool {
        self.pending
            .iter()
            .chain(self.active.iter())
            .any(|r| r.client == client)
    }

    fn finish_operation(&mut self, ctx: &mut CoreContext) {
        self.tracker.clear();
        self.exit_scanning(ctx);
        self.enter_idle(ctx);
    }

    fn enter_idle(&mut self, ctx: &mut CoreContext) {
        self.state = SingleScanState::Idle;
        self.try_start_new_scan(ctx);
    }

    fn exit_scanning(&mut self, ctx: &mut CoreContext) {
        self.active_scan = None;
        let active = mem::take(&mut self.active);
        fail_all(ctx, active, FailureReason::Unspecified, INTERRUPTED);
        self.state = SingleScanState::Idle;
        ctx.publish(ScanActivityEvent::SingleScanInProgress { in_progress: false });
    }

    fn set_emergency(&mut self, ctx: &CoreContext, in_progress: bool) {
        if self.emergency_in_progress != in_progress {
            self.emergency_in_progress = in_progress;
            ctx.publish(ScanActivityEvent::EmergencyScanInProgress { in_progress });
        }
    }

    fn arm_emergency_end_if_needed(&self, ctx: &mut CoreContext, requests: &[SingleRequest]) {
        if requests.iter().any(SingleRequest::is_emergency) {
            let delay = ctx.config.single.emergency_scan_end_delay();
            ctx.timers.arm(TimerKey::EmergencyScanEnd, AlarmSpec::exact(delay));
        }
    }

    /// Arms the emergency grace period when the signal is still raised but no
    /// emergency request is left to complete it.
    fn end_orphaned_emergency(&self, ctx: &mut CoreContext) {
        let outstanding = self
            .pending
            .iter()
            .chain(self.active.iter())
            .any(SingleRequest::is_emergency);
        if self.emergency_in_progress && !outstanding {
            let delay = ctx.config.single.emergency_scan_end_delay();
            ctx.timers.arm(TimerKey::EmergencyScanEnd, AlarmSpec::exact(delay));
        }
    }

    fn active_scan_satisfies(&self, plan: &ChannelPlan, settings: &ScanSettings) -> bool {
        let Some(active) = &self.active_scan else {
            return false;
        };
        if !scan_type_satisfies(active.scan_type, settings.scan_type) {
            return false;
        }
        if !active.channels.contains_settings(plan, settings) {
            return false;
        }
        if settings.report_events.wants_full_results()
            && !active.report_events.wants_full_results()
        {
            return false;
        }
        if !settings
            .hidden_networks
            .iter()
            .all(|ssid| active.hidden_networks.contains(ssid))
        {
            return false;
        }
        settings
            .vendor_ies
            .iter()
            .all(|ie| active.vendor_ies.contains(ie))
    }

    fn try_start_new_scan(&mut self, ctx: &mut CoreContext) {
        if self.pending.is_empty() {
            return;
        }
        let (native, active_scan) = merge_pending(
            ctx.plan(),
            &self.pending,
            ctx.config.single.max_vendor_ie_bytes,
        );

        let operation = ctx.next_operation();
        let started = self.tracker.start(operation, &ctx.engines, |iface, engine| {
            engine.start_single_scan(&native, ctx.sink(iface, EngineSource::Single, operation))
        });

        if started {
            debug!(
                %operation,
                requests = self.pending.len(),
                scan_type = native.scan_type.as_str(),
                channels = active_scan.channels.len(),
                "single scan started"
            );
            self.active_scan = Some(active_scan);
            self.active = mem::take(&mut self.pending);
            self.state = SingleScanState::Scanning;
            ctx.publish(ScanActivityEvent::SingleScanInProgress { in_progress: true });
        } else {
            error!(%operation, "no engine accepted the single scan");
            self.tracker.clear();
            let pending = mem::take(&mut self.pending);
            self.arm_emergency_end_if_needed(ctx, &pending);
            fail_all(ctx, pending, FailureReason::Unspecified, FAILED_TO_START);
        }
    }

    fn handle_scan_results(&mut self, ctx: &mut CoreContext, data: ScanData) {
        for request in &self.active {
            let filtered: Vec<ScanResult> = data
                .results
                .iter()
                .filter(|r| ctx.plan().settings_contain(&request.settings, r.frequency))
                .cloned()
                .collect();
            ctx.registry.deliver(
                request.client,
                ClientEvent::Results {
                    scans: vec![data.with_results(filtered)],
                },
            );
            ctx.registry
                .deliver(request.client, ClientEvent::SingleScanCompleted);
        }
        for listener in &self.listeners {
            ctx.registry.deliver(
                *listener,
                ClientEvent::Results {
                    scans: vec![data.clone()],
                },
            );
        }

        if data.scanned_bands.is_full_band_scan() {
            self.cached_results = data.results;
        }
        let active = mem::take(&mut self.active);
        self.arm_emergency_end_if_needed(ctx, &active);
    }

    fn report_full_result(&mut self, ctx: &mut CoreContext, result: ScanResult) {
        for request in &self.active {
            if request.settings.report_events.wants_full_results()
                && ctx.plan().settings_contain(&request.settings, result.frequency)
            {
                ctx.registry.deliver(
                    request.client,
                    ClientEvent::FullResult {
                        result: result.clone(),
                    },
                );
            }
        }
        for listener in &self.listeners {
            ctx.registry.deliver(
                *listener,
                ClientEvent::FullResult {
                    result: result.clone(),
                },
            );
        }
    }
}

fn fail_all(
    ctx: &mut CoreContext,
    requests: Vec<SingleRequest>,
    reason: FailureReason,
    description: &str,
) {
    for request in requests {
        debug!(client = %request.client, description, "single scan failed");
        ctx.registry.fail(request.client, reason, description);
    }
}

/// Folds every pending request into one single-bucket operation.
fn merge_pending(
    plan: &ChannelPlan,
    pending: &[SingleRequest],
    max_vendor_ie_bytes: usize,
) -> (NativeScanSettings, ActiveScan) {
    let mut scan_type = ScanType::default();
    let mut report_events = ReportEvents::AFTER_EACH_SCAN;
    let mut channels = ChannelCollection::default();
    let mut hidden_networks: Vec<String> = Vec::new();
    let mut vendor_ies: Vec<InformationElement> = Vec::new();

    for request in pending {
        let settings = &request.settings;
        scan_type = merge_scan_types(scan_type, settings.scan_type);
        channels.add_settings(plan, settings);
        for ssid in &settings.hidden_networks {
            if !hidden_networks.contains(ssid) {
                hidden_networks.push(ssid.clone());
            }
        }
        for ie in &settings.vendor_ies {
            if !vendor_ies.contains(ie) {
                vendor_ies.push(ie.clone());
            }
        }
        if settings.report_events.wants_full_results() {
            report_events |= ReportEvents::FULL_SCAN_RESULT;
        }
    }

    let mut encoded = Vec::new();
    let mut kept = Vec::new();
    for ie in vendor_ies {
        if encoded.len() + ie.encoded_len() > max_vendor_ie_bytes {
            warn!(id = ie.id, len = ie.bytes.len(), "dropping vendor IE over byte budget");
            continue;
        }
        ie.encode_into(&mut encoded);
        kept.push(ie);
    }

    let mut bucket = BucketSettings {
        bucket: 0,
        period_ms: 0,
        report_events,
        ..BucketSettings::default()
    };
    channels.fill_bucket(plan, &mut bucket);

    let native = NativeScanSettings {
        scan_type,
        hidden_network_ssids: hidden_networks.clone(),
        vendor_ies: encoded,
        buckets: vec![bucket],
        ..NativeScanSettings::default()
    };
    let active = ActiveScan {
        scan_type,
        report_events,
        channels,
        hidden_networks: hidden_networks.into_iter().collect(),
        vendor_ies: kept,
    };
    (native, active)
}
