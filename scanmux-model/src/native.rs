//! Engine-facing operation parameters produced by the schedulers.

use crate::band::WifiBand;
use crate::settings::{PnoNetwork, ReportEvents, ScanType};

/// One periodic schedule entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BucketSettings {
    /// Index of this bucket, also its bit in `ScanData::buckets_scanned`.
    pub bucket: u32,
    /// Band to sweep; unspecified when `frequencies` lists channels instead.
    pub band: WifiBand,
    pub frequencies: Vec<u32>,
    /// Zero for a one-shot scan.
    pub period_ms: u32,
    pub report_events: ReportEvents,
    pub max_period_ms: u32,
    pub step_count: u32,
}

/// Parameters of a single or batched scan as handed to an engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NativeScanSettings {
    pub base_period_ms: u32,
    pub max_ap_per_scan: u32,
    pub report_threshold_percent: u32,
    pub report_threshold_num_scans: u32,
    pub scan_type: ScanType,
    pub hidden_network_ssids: Vec<String>,
    /// Encoded vendor information elements to append to probe requests.
    pub vendor_ies: Vec<u8>,
    pub buckets: Vec<BucketSettings>,
}

impl NativeScanSettings {
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

/// Preferred-network list as handed to an engine's offload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NativePnoSettings {
    pub period_ms: u32,
    pub is_connected: bool,
    pub min_5ghz_rssi: i32,
    pub min_24ghz_rssi: i32,
    pub min_6ghz_rssi: i32,
    pub scan_iterations: u32,
    pub scan_interval_multiplier: u32,
    pub networks: Vec<PnoNetwork>,
}

/// Batched scan limits advertised by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanCapabilities {
    pub max_buckets: i32,
    pub max_ap_per_scan: i32,
}
