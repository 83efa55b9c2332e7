use crate::band::WifiBand;

/// Raw 802.11 information element attached to a result or a probe request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InformationElement {
    pub id: u8,
    pub id_ext: u8,
    pub bytes: Vec<u8>,
}

impl InformationElement {
    /// Element id used for vendor-specific payloads.
    pub const VENDOR_SPECIFIC: u8 = 221;

    pub fn vendor(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Self::VENDOR_SPECIFIC,
            id_ext: 0,
            bytes: bytes.into(),
        }
    }

    /// Size on the wire: id byte, length byte, payload.
    pub fn encoded_len(&self) -> usize {
        2 + self.bytes.len()
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.id);
        buf.push(self.bytes.len().min(u8::MAX as usize) as u8);
        buf.extend(self.bytes.iter().take(u8::MAX as usize));
    }
}

/// One observed access point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanResult {
    pub ssid: String,
    pub bssid: String,
    /// Primary channel frequency in MHz.
    pub frequency: u32,
    pub rssi: i32,
    /// Observation time in microseconds since boot.
    pub timestamp_us: u64,
    pub information_elements: Vec<InformationElement>,
}

impl ScanResult {
    pub fn new(
        ssid: impl Into<String>,
        bssid: impl Into<String>,
        frequency: u32,
        timestamp_us: u64,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.into(),
            frequency,
            rssi: -60,
            timestamp_us,
            information_elements: Vec::new(),
        }
    }

    pub fn has_information_elements(&self) -> bool {
        !self.information_elements.is_empty()
    }
}

/// Results of one scan pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanData {
    pub id: i32,
    pub flags: u32,
    /// Bit `n` set when background bucket `n` was part of this pass.
    pub buckets_scanned: u32,
    pub scanned_bands: WifiBand,
    pub results: Vec<ScanResult>,
}

impl ScanData {
    pub fn new(scanned_bands: WifiBand, results: Vec<ScanResult>) -> Self {
        Self {
            scanned_bands,
            results,
            ..Self::default()
        }
    }

    /// Copy of this pass carrying a different result list.
    pub fn with_results(&self, results: Vec<ScanResult>) -> Self {
        Self {
            id: self.id,
            flags: self.flags,
            buckets_scanned: self.buckets_scanned,
            scanned_bands: self.scanned_bands,
            results,
        }
    }
}
