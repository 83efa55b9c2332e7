use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::channels::ChannelPlan;

/// Global knobs that tune scheduler behaviour.
///
/// All fields carry defaults so deployments can override a single value
/// without supplying a full configuration payload.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanCoreConfig {
    /// One-shot scan merging, result caching and emergency signalling.
    pub single: SingleScanConfig,
    /// Periodic batched scan admission limits.
    pub background: BackgroundScanConfig,
    /// Preferred-network offload and its software fallback schedule.
    pub pno: PnoConfig,
    /// Frequencies making up each band.
    pub channel_plan: ChannelPlan,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleScanConfig {
    /// Cached results older than this are excluded from reads (ms).
    pub cached_results_max_age_ms: u64,
    /// How long the emergency-scan signal is held after the last emergency
    /// scan completes (ms).
    pub emergency_scan_end_delay_ms: u64,
    /// Byte budget for vendor information elements merged into one scan.
    pub max_vendor_ie_bytes: usize,
}

impl SingleScanConfig {
    pub fn emergency_scan_end_delay(&self) -> Duration {
        Duration::from_millis(self.emergency_scan_end_delay_ms)
    }
}

impl Default for SingleScanConfig {
    fn default() -> Self {
        Self {
            cached_results_max_age_ms: 180_000,
            emergency_scan_end_delay_ms: 15_000,
            max_vendor_ie_bytes: 512,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundScanConfig {
    /// Shortest accepted background period (ms).
    pub min_period_ms: u32,
    /// Longest accepted exponential backoff period (ms).
    pub max_period_ms: u32,
    /// Estimated dwell per channel, used to reject periods shorter than one
    /// pass over the requested channels (ms).
    pub scan_period_per_channel_ms: u32,
}

impl Default for BackgroundScanConfig {
    fn default() -> Self {
        Self {
            min_period_ms: 1_000,
            max_period_ms: 1_024_000,
            scan_period_per_channel_ms: 200,
        }
    }
}

/// Software PNO fallback. The schedule runs a mobility phase at the caller's
/// period with linear backoff, then a fast phase, then a slow inexact phase.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PnoConfig {
    /// Allow software PNO when no engine supports offload.
    pub software_pno_enabled: bool,
    pub mobility_iterations: u32,
    pub fast_timer_ms: u64,
    pub fast_iterations: u32,
    pub slow_timer_ms: u64,
    pub slow_iterations: u32,
    /// Window granted to the inexact slow-phase alarm before the upper-bound
    /// alarm fires (ms).
    pub slow_timer_margin_ms: u64,
}

impl Default for PnoConfig {
    fn default() -> Self {
        Self {
            software_pno_enabled: false,
            mobility_iterations: 3,
            fast_timer_ms: 120_000,
            fast_iterations: 2,
            slow_timer_ms: 360_000,
            slow_iterations: 5,
            slow_timer_margin_ms: 30_000,
        }
    }
}
