//! Folds periodic scan requests into a bounded set of hardware buckets.
//!
//! Each request is mapped onto a preferred period (10 s × 2^k) that divides
//! its own period, requests sharing a period share a bucket, and surplus
//! buckets are folded into a shorter bucket whose period divides theirs.
//! The result always covers every request's channels at a period that
//! divides the requested one, or the set is rejected as unschedulable.

use std::collections::BTreeMap;

use scanmux_model::{
    BucketSettings, NativeScanSettings, ReportEvents, ScanCapabilities,
    ScanData, ScanResult, ScanSettings,
};

use crate::error::{Result, ScanError};
use crate::scan::channels::{ChannelCollection, ChannelPlan};

/// Periods buckets are snapped to when a request's period allows it.
pub const PREDEFINED_PERIODS_MS: [u32; 8] = [
    10_000, 20_000, 40_000, 80_000, 160_000, 320_000, 640_000, 1_280_000,
];

/// Report threshold handed to the engine with every schedule.
const REPORT_THRESHOLD_PERCENT: u32 = 100;

/// Installed or candidate hardware schedule plus where each request landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundSchedule {
    pub settings: NativeScanSettings,
    /// Bucket index per input request, in input order.
    assignments: Vec<u32>,
}

impl BackgroundSchedule {
    pub fn empty() -> Self {
        Self {
            settings: NativeScanSettings::default(),
            assignments: Vec::new(),
        }
    }

    pub fn bucket_for(&self, request: usize) -> Option<u32> {
        self.assignments.get(request).copied()
    }

    pub fn num_buckets(&self) -> usize {
        self.settings.num_buckets()
    }
}

/// Largest predefined period dividing `period_ms`, else the period itself.
pub fn preferred_period(period_ms: u32) -> u32 {
    PREDEFINED_PERIODS_MS
        .iter()
        .rev()
        .find(|candidate| period_ms % **candidate == 0)
        .copied()
        .unwrap_or(period_ms)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Computes the full schedule for `requests`. Not incremental: callers pass
/// every active request each time.
pub fn compute_schedule(
    plan: &ChannelPlan,
    requests: &[&ScanSettings],
    capabilities: ScanCapabilities,
) -> Result<BackgroundSchedule> {
    let max_buckets = usize::try_from(capabilities.max_buckets).unwrap_or(0);
    if max_buckets == 0 && !requests.is_empty() {
        return Err(ScanError::Unschedulable(
            "engine reports no bucket capacity".to_string(),
        ));
    }

    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (index, settings) in requests.iter().enumerate() {
        groups
            .entry(preferred_period(settings.period_ms))
            .or_default()
            .push(index);
    }

    while groups.len() > max_buckets {
        let Some(longest) = groups.keys().next_back().copied() else {
            break;
        };
        let target = groups
            .keys()
            .rev()
            .skip(1)
            .find(|period| longest % **period == 0)
            .copied();
        let Some(target) = target else {
            return Err(ScanError::Unschedulable(format!(
                "no bucket period divides {longest}ms with {max_buckets} bucket(s)"
            )));
        };
        if let Some(members) = groups.remove(&longest) {
            groups.entry(target).or_default().extend(members);
        }
    }

    let mut assignments = vec![0; requests.len()];
    let mut buckets = Vec::with_capacity(groups.len());
    for (bucket_index, (period_ms, members)) in groups.iter().enumerate() {
        let bucket_index = bucket_index as u32;
        let mut channels = ChannelCollection::default();
        let mut report_events = ReportEvents::AFTER_BUFFER_FULL;
        for member in members {
            let settings = requests[*member];
            channels.add_settings(plan, settings);
            report_events |= settings.report_events;
            assignments[*member] = bucket_index;
        }

        let mut bucket = BucketSettings {
            bucket: bucket_index,
            period_ms: *period_ms,
            report_events,
            ..BucketSettings::default()
        };
        // Backoff survives only when one request owns the bucket outright.
        if let [only] = members.as_slice() {
            let settings = requests[*only];
            if settings.uses_backoff() && settings.period_ms == *period_ms {
                bucket.max_period_ms = settings.max_period_ms;
                bucket.step_count = settings.step_count;
            }
        }
        channels.fill_bucket(plan, &mut bucket);
        buckets.push(bucket);
    }

    let base_period_ms = buckets
        .iter()
        .map(|bucket| bucket.period_ms)
        .fold(0, gcd);

    let engine_cap = u32::try_from(capabilities.max_ap_per_scan).unwrap_or(0);
    let requested_cap = requests
        .iter()
        .map(|settings| settings.num_bssids_per_scan)
        .filter(|cap| *cap > 0)
        .max();
    let max_ap_per_scan = match requested_cap {
        Some(requested) if engine_cap > 0 => requested.min(engine_cap),
        Some(requested) => requested,
        None => engine_cap,
    };

    let report_threshold_num_scans = requests
        .iter()
        .map(|settings| settings.max_scans_to_cache)
        .filter(|count| *count > 0)
        .min()
        .unwrap_or(0);

    let settings = if buckets.is_empty() {
        NativeScanSettings::default()
    } else {
        NativeScanSettings {
            base_period_ms,
            max_ap_per_scan,
            report_threshold_percent: REPORT_THRESHOLD_PERCENT,
            report_threshold_num_scans,
            buckets,
            ..NativeScanSettings::default()
        }
    };

    Ok(BackgroundSchedule {
        settings,
        assignments,
    })
}

fn bucket_scanned(buckets_scanned: u32, bucket: u32) -> bool {
    // Zero means the engine did not attribute the pass to buckets.
    buckets_scanned == 0 || bucket >= 32 || buckets_scanned & (1 << bucket) != 0
}

/// Narrows batched results to what one request asked for. Returns `None`
/// when nothing is left to report.
pub fn filter_results_for_settings(
    plan: &ChannelPlan,
    bucket: Option<u32>,
    settings: &ScanSettings,
    scans: &[ScanData],
) -> Option<Vec<ScanData>> {
    let bucket = bucket?;
    let limit = match settings.num_bssids_per_scan {
        0 => usize::MAX,
        n => n as usize,
    };
    let filtered: Vec<ScanData> = scans
        .iter()
        .filter(|scan| bucket_scanned(scan.buckets_scanned, bucket))
        .map(|scan| {
            let results = scan
                .results
                .iter()
                .filter(|result| plan.settings_contain(settings, result.frequency))
                .take(limit)
                .cloned()
                .collect();
            scan.with_results(results)
        })
        .collect();
    if filtered.is_empty() {
        None
    } else {
        Some(filtered)
    }
}

pub fn should_report_full_result(
    plan: &ChannelPlan,
    bucket: Option<u32>,
    settings: &ScanSettings,
    result: &ScanResult,
    buckets_scanned: u32,
) -> bool {
    let Some(bucket) = bucket else {
        return false;
    };
    settings.report_events.wants_full_results()
        && bucket_scanned(buckets_scanned, bucket)
        && plan.settings_contain(settings, result.frequency)
}
