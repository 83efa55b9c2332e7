use std::ops::{BitOr, BitOrAssign};

use crate::band::WifiBand;
use crate::results::InformationElement;

/// Radio scan strategy requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanType {
    #[default]
    LowLatency,
    LowPower,
    HighAccuracy,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::LowLatency => "low_latency",
            ScanType::LowPower => "low_power",
            ScanType::HighAccuracy => "high_accuracy",
        }
    }
}

/// Bit set describing when results are reported back to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ReportEvents(u32);

impl ReportEvents {
    /// Report only when the engine's batch buffer is full.
    pub const AFTER_BUFFER_FULL: Self = Self(0);
    pub const AFTER_EACH_SCAN: Self = Self(1 << 0);
    pub const FULL_SCAN_RESULT: Self = Self(1 << 1);
    pub const NO_BATCH: Self = Self(1 << 2);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0b111)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: ReportEvents) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn wants_full_results(self) -> bool {
        self.contains(Self::FULL_SCAN_RESULT)
    }
}

impl BitOr for ReportEvents {
    type Output = ReportEvents;

    fn bitor(self, rhs: Self) -> Self::Output {
        ReportEvents(self.0 | rhs.0)
    }
}

impl BitOrAssign for ReportEvents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Parameters of one scan request, shared by single and background scans.
///
/// Background-only fields (`period_ms`, `max_period_ms`, `step_count`,
/// `max_scans_to_cache`) are ignored by single scans.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScanSettings {
    /// Bands to sweep. When unspecified, `channels` must be non-empty.
    pub band: WifiBand,
    /// Explicit channel list in MHz, used when `band` is unspecified.
    pub channels: Vec<u32>,
    pub scan_type: ScanType,
    pub report_events: ReportEvents,
    /// Desired period for background scans.
    pub period_ms: u32,
    /// Upper bound for exponential backoff. Zero disables backoff.
    pub max_period_ms: u32,
    /// Number of scans between backoff steps.
    pub step_count: u32,
    /// Cap on reported access points per scan. Zero means no cap.
    pub num_bssids_per_scan: u32,
    pub max_scans_to_cache: u32,
    /// SSIDs to probe explicitly.
    pub hidden_networks: Vec<String>,
    pub vendor_ies: Vec<InformationElement>,
    /// Emergency request that bypasses the location and scanning toggles.
    pub ignore_location_settings: bool,
}

impl ScanSettings {
    pub fn for_band(band: WifiBand) -> Self {
        Self {
            band,
            ..Self::default()
        }
    }

    pub fn for_channels(channels: impl IntoIterator<Item = u32>) -> Self {
        Self {
            channels: channels.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn uses_backoff(&self) -> bool {
        self.max_period_ms != 0 && self.max_period_ms != self.period_ms
    }
}

/// Network entry handed to preferred-network matching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PnoNetwork {
    pub ssid: String,
    pub flags: u8,
    pub auth_bit_field: u8,
    /// Frequencies the network was last seen on, used as a hint by offload.
    pub frequencies: Vec<u32>,
}

impl PnoNetwork {
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            ..Self::default()
        }
    }
}

/// Preferred-network parameters supplied with a PNO start request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PnoSettings {
    pub is_connected: bool,
    pub min_5ghz_rssi: i32,
    pub min_24ghz_rssi: i32,
    pub min_6ghz_rssi: i32,
    /// Scan iterations the offload may run at the base period.
    pub scan_iterations: u32,
    /// Multiplier applied to the base period once iterations are exhausted.
    pub scan_interval_multiplier: u32,
    pub networks: Vec<PnoNetwork>,
}

/// Accounting token naming the uids charged for a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkSource {
    pub uids: Vec<u32>,
}

impl WorkSource {
    pub fn from_uid(uid: u32) -> Self {
        Self { uids: vec![uid] }
    }
}

/// Who a registered caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientIdentity {
    pub uid: u32,
    pub package_name: String,
}

impl ClientIdentity {
    pub fn new(uid: u32, package_name: impl Into<String>) -> Self {
        Self {
            uid,
            package_name: package_name.into(),
        }
    }
}
